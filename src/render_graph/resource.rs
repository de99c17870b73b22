//! Logical resources of the render graph

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHasher;

use crate::backend::*;

fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Unique identifier for a render graph resource
///
/// Equality and ordering use the hash of the name only. The name is kept for
/// diagnostics.
#[derive(Clone)]
pub struct ResourceId {
    hash: u64,
    name: Arc<str>,
}

impl ResourceId {
    pub fn new(name: &str) -> Self {
        Self {
            hash: hash_name(name),
            name: Arc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// A named view onto this resource.
    pub fn view(&self, view_name: &str) -> ResourceViewId {
        ResourceViewId::new(self, view_name)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named view onto a resource. Several views may alias one resource.
#[derive(Clone)]
pub struct ResourceViewId {
    resource: ResourceId,
    view: u64,
    view_name: Arc<str>,
}

impl ResourceViewId {
    pub fn new(resource: &ResourceId, view_name: &str) -> Self {
        Self {
            resource: resource.clone(),
            view: hash_name(view_name),
            view_name: Arc::from(view_name),
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }
}

impl PartialEq for ResourceViewId {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource && self.view == other.view
    }
}

impl Eq for ResourceViewId {}

impl Hash for ResourceViewId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.view.hash(state);
    }
}

impl PartialOrd for ResourceViewId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceViewId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.resource
            .cmp(&other.resource)
            .then(self.view.cmp(&other.view))
    }
}

impl fmt::Debug for ResourceViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceViewId({}:{})", self.resource.name, self.view_name)
    }
}

impl fmt::Display for ResourceViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource.name, self.view_name)
    }
}

/// Subresource selection of a view. `mip == None` selects every subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubresourceView {
    pub plane: u32,
    pub array: u32,
    pub mip: Option<u32>,
}

impl SubresourceView {
    pub const ALL: Self = Self {
        plane: 0,
        array: 0,
        mip: None,
    };

    pub fn mip(mip: u32) -> Self {
        Self {
            plane: 0,
            array: 0,
            mip: Some(mip),
        }
    }

    /// Flat subresource index, `None` when the view covers everything.
    pub fn index(&self, mip_levels: u32, array_size: u32) -> Option<u32> {
        self.mip
            .map(|mip| mip + self.array * mip_levels + self.plane * mip_levels * array_size)
    }

    /// Subresource a view touches on `desc`.
    pub fn for_view(view: Option<&ViewDesc>, desc: &ResourceDesc) -> Self {
        let Some(texture) = desc.texture() else {
            return Self::ALL;
        };
        // Views carry no array range, a per-mip view covers every slice
        if texture.mip_levels <= 1 || texture.depth_or_array_size > 1 {
            return Self::ALL;
        }
        match view {
            Some(ViewDesc::RenderTarget(Some(rtv))) => Self::mip(rtv.mip_slice),
            Some(ViewDesc::UnorderedAccess(Some(uav))) => Self::mip(uav.mip_slice),
            Some(ViewDesc::ShaderResource(Some(srv))) if srv.mip_levels == Some(1) => {
                Self::mip(srv.most_detailed_mip)
            }
            _ => Self::ALL,
        }
    }

    pub fn to_subresource(&self, desc: &ResourceDesc) -> Subresource {
        let (mip_levels, array_size) = match desc.texture() {
            Some(texture) => (texture.mip_levels.max(1), texture.depth_or_array_size.max(1)),
            None => (1, 1),
        };
        match self.index(mip_levels, array_size) {
            Some(index) => Subresource::Index(index),
            None => Subresource::All,
        }
    }
}

/// Description of a logical resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor, BufferType),
}

impl ResourceDesc {
    pub fn texture(&self) -> Option<&TextureDescriptor> {
        match self {
            ResourceDesc::Texture(desc) => Some(desc),
            ResourceDesc::Buffer(..) => None,
        }
    }

    pub fn buffer(&self) -> Option<(&BufferDescriptor, BufferType)> {
        match self {
            ResourceDesc::Texture(_) => None,
            ResourceDesc::Buffer(desc, ty) => Some((desc, *ty)),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        match self {
            ResourceDesc::Texture(desc) => desc.subresource_count(),
            ResourceDesc::Buffer(..) => 1,
        }
    }

    /// Whether a re-declaration with `other` may share this resource.
    pub fn is_compatible(&self, other: &ResourceDesc) -> bool {
        match (self, other) {
            (ResourceDesc::Texture(a), ResourceDesc::Texture(b)) => a.same_shape(b),
            (ResourceDesc::Buffer(a, ta), ResourceDesc::Buffer(b, tb)) => {
                a.size == b.size && a.alignment == b.alignment && ta == tb
            }
            _ => false,
        }
    }

    /// Fold the usage of a compatible re-declaration into this one.
    pub fn merge_usage(&mut self, other: &ResourceDesc) {
        match (self, other) {
            (ResourceDesc::Texture(a), ResourceDesc::Texture(b)) => {
                a.usage |= b.usage;
                if a.clear_value.is_none() {
                    a.clear_value = b.clear_value;
                }
            }
            (ResourceDesc::Buffer(a, _), ResourceDesc::Buffer(b, _)) => a.usage |= b.usage,
            _ => {}
        }
    }

    /// Whether a pooled object created for `self` can back `other`.
    ///
    /// Labels are ignored, everything else must match.
    pub fn is_identical(&self, other: &ResourceDesc) -> bool {
        match (self, other) {
            (ResourceDesc::Texture(a), ResourceDesc::Texture(b)) => {
                a.same_shape(b) && a.usage == b.usage && a.clear_value == b.clear_value
            }
            (ResourceDesc::Buffer(a, ta), ResourceDesc::Buffer(b, tb)) => {
                a.size == b.size && a.usage == b.usage && a.alignment == b.alignment && ta == tb
            }
            _ => false,
        }
    }
}

bitflags! {
    /// Resource flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        /// Supplied from outside the graph
        const IMPORTED = 1 << 0;
        /// Width and height follow the output surface
        const WINDOW_SIZE_DEPENDENT = 1 << 1;
    }
}

/// Who owns the GPU object behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Created and destroyed by the graph
    Owned,
    /// Imported; never destroyed by the graph
    Borrowed,
}

/// A view declared on a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    /// `None` for copy access, which needs no descriptor
    pub desc: Option<ViewDesc>,
    pub subresource: SubresourceView,
    pub descriptor: Option<DescriptorHandle>,
}

/// One logical resource
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub desc: ResourceDesc,
    pub resource: Option<GpuResourceHandle>,
    pub flags: ResourceFlags,
    pub ownership: Ownership,
    /// State an imported object is in when handed to the graph
    pub initial_state: ResourceState,
    pub views: BTreeMap<ResourceViewId, ViewEntry>,
}

impl ResourceHandle {
    pub fn is_imported(&self) -> bool {
        self.flags.contains(ResourceFlags::IMPORTED)
    }

    pub fn is_window_size_dependent(&self) -> bool {
        self.flags.contains(ResourceFlags::WINDOW_SIZE_DEPENDENT)
    }
}

/// How a pass reads a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAccess {
    PixelShader,
    NonPixelShader,
    AllShaders,
    CopySource,
}

impl ReadAccess {
    pub fn required_state(&self) -> ResourceState {
        match self {
            ReadAccess::PixelShader => ResourceState::PIXEL_SHADER_RESOURCE,
            ReadAccess::NonPixelShader => ResourceState::NON_PIXEL_SHADER_RESOURCE,
            ReadAccess::AllShaders => ResourceState::ALL_SHADER_RESOURCE,
            ReadAccess::CopySource => ResourceState::COPY_SOURCE,
        }
    }
}

/// How a pass writes a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAccess {
    RenderTarget,
    DepthWrite,
    UnorderedAccess,
    CopyDest,
}

impl WriteAccess {
    pub fn required_state(&self) -> ResourceState {
        match self {
            WriteAccess::RenderTarget => ResourceState::RENDER_TARGET,
            WriteAccess::DepthWrite => ResourceState::DEPTH_WRITE,
            WriteAccess::UnorderedAccess => ResourceState::UNORDERED_ACCESS,
            WriteAccess::CopyDest => ResourceState::COPY_DEST,
        }
    }

    /// Usage a texture needs to be written this way.
    pub fn texture_usage(&self) -> TextureUsage {
        match self {
            WriteAccess::RenderTarget => TextureUsage::RENDER_TARGET,
            WriteAccess::DepthWrite => TextureUsage::DEPTH_STENCIL,
            WriteAccess::UnorderedAccess => TextureUsage::UNORDERED_ACCESS,
            WriteAccess::CopyDest => TextureUsage::COPY_DST,
        }
    }
}

/// Resource lifetime in dependency levels, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub creation_level: usize,
    pub destruction_level: usize,
    pub imported: bool,
}

impl ResourceLifetime {
    pub fn contains(&self, level: usize) -> bool {
        level >= self.creation_level && level <= self.destruction_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_equality_by_hash() {
        let a = ResourceId::new("Albedo");
        let b = ResourceId::from("Albedo");
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(a, ResourceId::new("Normal"));
        assert_eq!(a.to_string(), "Albedo");
    }

    #[test]
    fn test_view_ordering_groups_by_resource() {
        let albedo = ResourceId::new("Albedo");
        let normal = ResourceId::new("Normal");
        let mut views = vec![normal.view("srv"), albedo.view("rtv"), albedo.view("srv")];
        views.sort();
        assert_eq!(views[0].resource(), views[1].resource());
        assert_ne!(albedo.view("rtv"), albedo.view("srv"));
    }

    #[test]
    fn test_subresource_index() {
        let view = SubresourceView {
            plane: 1,
            array: 2,
            mip: Some(3),
        };
        // 3 + 2 * 4 + 1 * 4 * 6
        assert_eq!(view.index(4, 6), Some(35));
        assert_eq!(SubresourceView::ALL.index(4, 6), None);
    }

    #[test]
    fn test_subresource_for_mip_view() {
        let desc = ResourceDesc::Texture(
            TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba16Float).with_mip_levels(5),
        );
        let rtv = ViewDesc::RenderTarget(Some(RtvDesc {
            mip_slice: 2,
            ..Default::default()
        }));
        let view = SubresourceView::for_view(Some(&rtv), &desc);
        assert_eq!(view.to_subresource(&desc), Subresource::Index(2));
        assert_eq!(
            SubresourceView::for_view(Some(&ViewDesc::ShaderResource(None)), &desc),
            SubresourceView::ALL
        );
    }

    #[test]
    fn test_mip_view_of_array_covers_every_slice() {
        let mut texture = TextureDescriptor::new_2d(128, 128, TextureFormat::Rgba8Unorm).with_mip_levels(4);
        texture.depth_or_array_size = 6;
        let desc = ResourceDesc::Texture(texture);
        let uav = ViewDesc::UnorderedAccess(Some(UavDesc {
            mip_slice: 1,
            ..Default::default()
        }));
        let view = SubresourceView::for_view(Some(&uav), &desc);
        assert_eq!(view, SubresourceView::ALL);
        assert_eq!(view.to_subresource(&desc), Subresource::All);
    }

    #[test]
    fn test_desc_compatibility() {
        let a = ResourceDesc::Texture(TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm));
        let b = ResourceDesc::Texture(
            TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm)
                .with_usage(TextureUsage::RENDER_TARGET),
        );
        let buffer = ResourceDesc::Buffer(
            BufferDescriptor::new(64, BufferUsage::STORAGE),
            BufferType::Default,
        );
        assert!(a.is_compatible(&b));
        assert!(!a.is_identical(&b));
        assert!(!a.is_compatible(&buffer));

        let mut merged = a.clone();
        merged.merge_usage(&b);
        assert!(merged.is_identical(&b));
    }

    #[test]
    fn test_access_states() {
        assert_eq!(
            ReadAccess::AllShaders.required_state(),
            ResourceState::ALL_SHADER_RESOURCE
        );
        assert_eq!(
            WriteAccess::DepthWrite.required_state(),
            ResourceState::DEPTH_WRITE
        );
        assert!(WriteAccess::UnorderedAccess.required_state().has_write());
        assert!(ReadAccess::CopySource.required_state().is_read_only());
    }
}
