//! Seams between the loader and a renderer.
//!
//! The loader only reads camera state from a [`RenderContext`], hands the
//! visible hierarchy texture to [`ShaderEffect`]s and places debug cubes into
//! a [`DebugScene`]. [`Camera`] is a headless context for tools and tests.

use glam::{DMat4, DVec3};

use crate::texture::VisibleOctreeHierarchyTexture;

/// Shader parameter receiving the visible hierarchy texture.
pub const OCTREE_TEX_PARAM: &str = "OctreeTex";

/// Name of the debug nodes placed by `show_octants`.
pub const WIREFRAME_NODE_NAME: &str = "WireframeCube";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointSizeMode {
    #[default]
    FixedPixelSize,
    FixedWorldSize,
    /// Point size depends on the local octree depth, which the shader reads
    /// from the visible hierarchy texture.
    AdaptiveSize,
}

/// Camera and viewport state of the frame being rendered.
pub trait RenderContext {
    fn view(&self) -> DMat4;

    fn projection(&self) -> DMat4;

    fn viewport_width(&self) -> u32;

    fn viewport_height(&self) -> u32;

    /// Vertical field of view in radians.
    fn fov_y(&self) -> f64;

    /// Called with the rebuilt texture when the visible set changes in
    /// [`PointSizeMode::AdaptiveSize`].
    fn upload_hierarchy_texture(&mut self, _texture: &VisibleOctreeHierarchyTexture) {}
}

/// A shader effect with a settable texture parameter.
pub trait ShaderEffect {
    fn set_texture_param(&mut self, name: &str, texture: &VisibleOctreeHierarchyTexture);
}

/// A debug node as placed by [`DebugScene::add_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct DebugNode {
    pub name: String,
    pub center: DVec3,
    pub size: f64,
}

/// Scene graph that receives wireframe cubes of the resident octants.
pub trait DebugScene {
    fn add_node(&mut self, node: DebugNode);

    /// Removes all nodes called `name` and returns how many were removed.
    fn remove_nodes_named(&mut self, name: &str) -> usize;
}

impl DebugScene for Vec<DebugNode> {
    fn add_node(&mut self, node: DebugNode) {
        self.push(node);
    }

    fn remove_nodes_named(&mut self, name: &str) -> usize {
        let before = self.len();
        self.retain(|n| n.name != name);
        before - self.len()
    }
}

/// A render context without a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub view: DMat4,
    pub projection: DMat4,
    pub width: u32,
    pub height: u32,
    pub fov_y: f64,
    /// Texel count of the last uploaded hierarchy texture.
    pub uploaded_texels: Option<usize>,
}

impl Camera {
    /// Right-handed perspective camera at `eye` looking at `target`.
    pub fn look_at(eye: DVec3, target: DVec3, fov_y: f64, width: u32, height: u32) -> Self {
        let aspect = width as f64 / height.max(1) as f64;
        Self {
            view: DMat4::look_at_rh(eye, target, DVec3::Y),
            projection: DMat4::perspective_rh_gl(fov_y, aspect, 0.1, 10_000.0),
            width,
            height,
            fov_y,
            uploaded_texels: None,
        }
    }

    pub fn eye(&self) -> DVec3 {
        self.view.inverse().w_axis.truncate()
    }
}

impl RenderContext for Camera {
    fn view(&self) -> DMat4 {
        self.view
    }

    fn projection(&self) -> DMat4 {
        self.projection
    }

    fn viewport_width(&self) -> u32 {
        self.width
    }

    fn viewport_height(&self) -> u32 {
        self.height
    }

    fn fov_y(&self) -> f64 {
        self.fov_y
    }

    fn upload_hierarchy_texture(&mut self, texture: &VisibleOctreeHierarchyTexture) {
        self.uploaded_texels = Some(texture.len());
    }
}
