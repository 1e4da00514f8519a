//! Scene renderer seam and the built-in voxel viewer.

pub mod camera;
pub mod light;
pub mod mesh;
pub mod viewer;

pub use camera::PerspectiveCamera;
pub use light::Light;
pub use viewer::{RendererFactory, SceneRenderer, VoxelViewer, VoxelViewerFactory};
