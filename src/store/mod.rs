//! Store, resources and descriptor persistence.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! └── <resource-id>/
//!     ├── descriptor.json
//!     └── <pyramid-id>/
//!         └── <mosaic-id>/
//!             ├── 0_0.png
//!             └── 0_1.png
//! ```
//!
//! # Components
//!
//! - [`TileStore`]: the root directory, codec and write pool
//! - [`CoverageResource`]: one coverage with its pixel format and pyramids
//! - [`ResourceDescriptor`]: the JSON document persisted per resource
//! - [`SaveCoordinator`]: coalesces concurrent descriptor saves

pub mod descriptor;
mod registry;
pub(crate) mod resource;
mod save;

pub use descriptor::{
    MosaicDescriptor, PyramidDescriptor, ResourceDescriptor, DESCRIPTOR_FILE, DESCRIPTOR_VERSION,
};
pub use registry::TileStore;
pub use resource::{CoverageResource, ResourceOptions};
pub use save::{SaveCoordinator, SaveState};
