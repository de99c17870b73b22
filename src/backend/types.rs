//! Common types shared between the graph and backends

use bitflags::bitflags;
use glam::Vec4;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Rgb10A2Unorm,
    Depth32Float,
    Depth24PlusStencil8,
    R32Float,
    R32Uint,
    Rg32Float,
}

/// Group of formats sharing one memory layout. Views may reinterpret a
/// texture only within its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    Rgba8,
    Bgra8,
    Rgba16,
    Rgba32,
    Rgb10A2,
    R32,
    Rg32,
    Depth32,
    Depth24Stencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rgb10A2Unorm
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::R32Float
            | TextureFormat::R32Uint => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => FormatFamily::Rgba8,
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => FormatFamily::Bgra8,
            TextureFormat::Rgba16Float => FormatFamily::Rgba16,
            TextureFormat::Rgba32Float => FormatFamily::Rgba32,
            TextureFormat::Rgb10A2Unorm => FormatFamily::Rgb10A2,
            TextureFormat::R32Float | TextureFormat::R32Uint => FormatFamily::R32,
            TextureFormat::Rg32Float => FormatFamily::Rg32,
            TextureFormat::Depth32Float => FormatFamily::Depth32,
            TextureFormat::Depth24PlusStencil8 => FormatFamily::Depth24Stencil8,
        }
    }

    /// Whether a view of format `view` may be created on a texture of this
    /// format.
    ///
    /// Depth formats may additionally be read through a single-channel
    /// float view (sampling the depth plane).
    pub fn is_view_compatible(&self, view: TextureFormat) -> bool {
        if self.family() == view.family() {
            return true;
        }
        matches!(
            (self, view),
            (TextureFormat::Depth32Float, TextureFormat::R32Float)
        )
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const SHADER_RESOURCE = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const RENDER_TARGET = 1 << 4;
        const DEPTH_STENCIL = 1 << 5;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const INDEX = 1 << 2;
        const VERTEX = 1 << 3;
        const UNIFORM = 1 << 4;
        const STORAGE = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

/// Dimensionality of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

/// Value a render target or depth-stencil texture is cleared to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color(Vec4),
    DepthStencil { depth: f32, stencil: u8 },
}

impl ClearValue {
    pub fn color(&self) -> Option<Vec4> {
        match self {
            ClearValue::Color(color) => Some(*color),
            ClearValue::DepthStencil { .. } => None,
        }
    }

    pub fn depth_stencil(&self) -> Option<(f32, u8)> {
        match self {
            ClearValue::Color(_) => None,
            ClearValue::DepthStencil { depth, stencil } => Some((*depth, *stencil)),
        }
    }
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array size otherwise
    pub depth_or_array_size: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub clear_value: Option<ClearValue>,
    pub alignment: u64,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            width: 1,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SHADER_RESOURCE,
            clear_value: None,
            alignment: 0,
        }
    }
}

impl TextureDescriptor {
    /// Describe a single-mip 2D texture.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage |= usage;
        self
    }

    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = Some(clear_value);
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.depth_or_array_size = array_size;
        self
    }

    /// Number of planes of the format (depth-stencil formats carry two).
    pub fn plane_count(&self) -> u32 {
        if self.format.has_stencil() {
            2
        } else {
            1
        }
    }

    /// Number of independently tracked subresources.
    pub fn subresource_count(&self) -> u32 {
        let array_size = match self.dimension {
            TextureDimension::D3 => 1,
            TextureDimension::D1 | TextureDimension::D2 => self.depth_or_array_size.max(1),
        };
        self.mip_levels.max(1) * array_size * self.plane_count()
    }

    /// Two descriptors describe the same allocation shape when everything but
    /// label, usage and clear value matches.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && self.width == other.width
            && self.height == other.height
            && self.depth_or_array_size == other.depth_or_array_size
            && self.mip_levels == other.mip_levels
            && self.format == other.format
            && self.alignment == other.alignment
    }
}

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
    pub alignment: u64,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            alignment: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Memory placement of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferType {
    /// GPU-local memory
    #[default]
    Default,
    /// CPU-writable memory for uploads
    Upload,
    /// CPU-readable memory for readbacks
    Readback,
}

/// Descriptor heap a view is allocated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views
    ResourceView,
    RenderTargetView,
    DepthStencilView,
}

/// Queue a command list records for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics queue, accepts draw, compute and copy commands
    Direct,
    Compute,
}

/// How a render target view is cleared when its pass begins
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RenderTargetClear {
    /// Keep previous contents
    Ignore,
    /// Clear to the texture's clear value
    #[default]
    UseResourceClear,
    /// Clear to an explicit colour
    Force(Vec4),
}

/// How a depth-stencil view is cleared when its pass begins
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DepthStencilClear {
    Ignore,
    Depth,
    Stencil,
    #[default]
    DepthStencil,
}

/// Constant buffer view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CbvDesc {
    pub offset: u64,
    pub size: u64,
}

/// Shader resource view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrvDesc {
    pub format: Option<TextureFormat>,
    pub most_detailed_mip: u32,
    pub mip_levels: Option<u32>,
}

/// Unordered access view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UavDesc {
    pub format: Option<TextureFormat>,
    pub mip_slice: u32,
}

/// Render target view
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RtvDesc {
    pub format: Option<TextureFormat>,
    pub mip_slice: u32,
    pub clear: RenderTargetClear,
}

/// Depth-stencil view
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DsvDesc {
    pub format: Option<TextureFormat>,
    pub clear: DepthStencilClear,
    pub force_depth: Option<f32>,
    pub force_stencil: Option<u8>,
}

/// Interpretation of a resource requested by a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewDesc {
    ConstantBuffer(CbvDesc),
    ShaderResource(Option<SrvDesc>),
    UnorderedAccess(Option<UavDesc>),
    RenderTarget(Option<RtvDesc>),
    DepthStencil(Option<DsvDesc>),
}

impl ViewDesc {
    /// Heap the view's descriptor lives in.
    pub fn heap_type(&self) -> DescriptorHeapType {
        match self {
            ViewDesc::ConstantBuffer(_)
            | ViewDesc::ShaderResource(_)
            | ViewDesc::UnorderedAccess(_) => DescriptorHeapType::ResourceView,
            ViewDesc::RenderTarget(_) => DescriptorHeapType::RenderTargetView,
            ViewDesc::DepthStencil(_) => DescriptorHeapType::DepthStencilView,
        }
    }

    /// Format override requested by the view, if any.
    pub fn format(&self) -> Option<TextureFormat> {
        match self {
            ViewDesc::ConstantBuffer(_) => None,
            ViewDesc::ShaderResource(desc) => desc.and_then(|d| d.format),
            ViewDesc::UnorderedAccess(desc) => desc.and_then(|d| d.format),
            ViewDesc::RenderTarget(desc) => desc.and_then(|d| d.format),
            ViewDesc::DepthStencil(desc) => desc.and_then(|d| d.format),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ViewDesc::ConstantBuffer(_) => "constant buffer",
            ViewDesc::ShaderResource(_) => "shader resource",
            ViewDesc::UnorderedAccess(_) => "unordered access",
            ViewDesc::RenderTarget(_) => "render target",
            ViewDesc::DepthStencil(_) => "depth stencil",
        }
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with a [0, 1] depth range.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_compatibility() {
        assert!(TextureFormat::Rgba8Unorm.is_view_compatible(TextureFormat::Rgba8UnormSrgb));
        assert!(TextureFormat::Depth32Float.is_view_compatible(TextureFormat::R32Float));
        assert!(!TextureFormat::Rgba8Unorm.is_view_compatible(TextureFormat::Rgba16Float));
        assert!(!TextureFormat::R32Float.is_view_compatible(TextureFormat::Depth32Float));
    }

    #[test]
    fn test_subresource_count() {
        let desc = TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm)
            .with_mip_levels(4)
            .with_array_size(6);
        assert_eq!(desc.subresource_count(), 24);

        let depth = TextureDescriptor::new_2d(64, 64, TextureFormat::Depth24PlusStencil8);
        assert_eq!(depth.subresource_count(), 2);
    }

    #[test]
    fn test_same_shape_ignores_usage() {
        let a = TextureDescriptor::new_2d(128, 128, TextureFormat::Rgba16Float)
            .with_usage(TextureUsage::RENDER_TARGET);
        let b = TextureDescriptor::new_2d(128, 128, TextureFormat::Rgba16Float)
            .with_label("other")
            .with_usage(TextureUsage::UNORDERED_ACCESS);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&TextureDescriptor::new_2d(64, 128, TextureFormat::Rgba16Float)));
    }

    #[test]
    fn test_view_heap_types() {
        assert_eq!(
            ViewDesc::RenderTarget(None).heap_type(),
            DescriptorHeapType::RenderTargetView
        );
        assert_eq!(
            ViewDesc::ShaderResource(None).heap_type(),
            DescriptorHeapType::ResourceView
        );
        assert_eq!(
            ViewDesc::DepthStencil(None).heap_type(),
            DescriptorHeapType::DepthStencilView
        );
    }
}
