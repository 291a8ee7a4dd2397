//! Domain Layer
//!
//! Value objects identifying watched resource types and the port through
//! which the exporter reaches the remote cluster API.
//!
//! # Usage
//!
//! ```ignore
//! use managed_metrics::domain::{GroupVersionResource, ResourceIdentity, ResourceSource};
//!
//! async fn count<S: ResourceSource>(source: &S) -> Result<usize> {
//!     let gvr = GroupVersionResource::new("s3.aws.upbound.io", "v1beta1", "buckets");
//!     let list = source.list(&ResourceIdentity::cluster_scoped(gvr)).await?;
//!     Ok(list.items.len())
//! }
//! ```

pub mod ports;

pub use ports::{
    GroupVersionResource, ResourceEvent, ResourceEventStream, ResourceIdentity, ResourceList,
    ResourceSource,
};
