//! Budgeted, view-dependent streaming of out-of-core point clouds.
//!
//! An [`OctantLoader`] keeps the octants that matter most for the current
//! camera in memory. Loads run on background threads; the render thread only
//! calls [`OctantLoader::update_scene`] once per frame.
//!
//! ```no_run
//! use pcloud_streaming::{Camera, LoaderConfig, OctantLoader, PointSizeMode};
//! use glam::DVec3;
//!
//! let config = LoaderConfig::new()
//!     .with_point_threshold(500_000)
//!     .with_file_folder_path("scan.oocpc");
//! let mut loader: OctantLoader = OctantLoader::new(config);
//! let mut camera = Camera::look_at(DVec3::new(0.0, 0.0, 50.0), DVec3::ZERO, 1.0, 1280, 720);
//! loader.init(&camera)?;
//! loop {
//!     if loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []) {
//!         for (octant, cloud) in loader.resident_clouds() {
//!             println!("{}: {} points", octant.id, cloud.len());
//!         }
//!     }
//! #   break;
//! }
//! # Ok::<(), pcloud_core::PointCloudError>(())
//! ```

pub mod config;
pub mod frustum;
pub mod lifecycle;
pub mod loader;
pub mod priority;
pub mod render_context;
pub mod texture;
mod worker;

pub use config::LoaderConfig;
pub use frustum::Frustum;
pub use lifecycle::OctantState;
pub use loader::{LoaderStats, OctantLoader};
pub use render_context::{
    Camera, DebugNode, DebugScene, PointSizeMode, RenderContext, ShaderEffect, OCTREE_TEX_PARAM,
    WIREFRAME_NODE_NAME,
};
pub use texture::VisibleOctreeHierarchyTexture;
