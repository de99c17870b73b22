//! Common utilities for render graph integration tests.

use frame_graph::backend::*;
use frame_graph::render_graph::*;
use frame_graph::GraphConfig;

/// Initialise logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Graph over the recording backend with validation on.
pub fn new_graph(parallel: bool) -> RenderGraph<DummyBackend> {
    init_logging();
    let config = GraphConfig::default()
        .with_validation(true)
        .with_parallel_recording(parallel);
    RenderGraph::new(DummyBackend::new(), config)
}

pub fn small_texture() -> TextureDescriptor {
    TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm)
}

enum Creation {
    Texture(TextureDescriptor),
    Buffer(u64),
}

/// Configurable pass for building test topologies.
///
/// Reads go through a pixel-shader SRV named "srv", unordered writes through
/// a UAV named "uav" and render target writes through an RTV named "rtv".
/// Dispatch checks every referenced resource is backed and records a
/// one-group dispatch.
pub struct TestPass {
    name: String,
    queue: QueueType,
    flags: PassFlags,
    creates: Vec<(ResourceId, Creation)>,
    reads: Vec<(ResourceId, ReadAccess)>,
    writes: Vec<ResourceId>,
    render_targets: Vec<ResourceId>,
}

#[allow(dead_code)]
impl TestPass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: QueueType::Direct,
            flags: PassFlags::empty(),
            creates: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            render_targets: Vec::new(),
        }
    }

    pub fn creates(self, id: &str) -> Self {
        self.creates_texture(id, small_texture())
    }

    pub fn creates_texture(mut self, id: &str, desc: TextureDescriptor) -> Self {
        self.creates.push((ResourceId::new(id), Creation::Texture(desc)));
        self
    }

    pub fn creates_buffer(mut self, id: &str, size: u64) -> Self {
        self.creates.push((ResourceId::new(id), Creation::Buffer(size)));
        self
    }

    pub fn reads(self, id: &str) -> Self {
        self.reads_with(id, ReadAccess::PixelShader)
    }

    pub fn reads_with(mut self, id: &str, access: ReadAccess) -> Self {
        self.reads.push((ResourceId::new(id), access));
        self
    }

    pub fn writes(mut self, id: &str) -> Self {
        self.writes.push(ResourceId::new(id));
        self
    }

    pub fn renders_to(mut self, id: &str) -> Self {
        self.render_targets.push(ResourceId::new(id));
        self
    }

    pub fn queue(mut self, queue: QueueType) -> Self {
        self.queue = queue;
        self
    }

    pub fn flags(mut self, flags: PassFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl RenderPass for TestPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn flags(&self) -> PassFlags {
        self.flags
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        for (id, creation) in &self.creates {
            match creation {
                Creation::Texture(desc) => resolver.create_texture(id, desc.clone(), ResourceFlags::empty())?,
                Creation::Buffer(size) => resolver.create_buffer(
                    id,
                    BufferDescriptor::new(*size, BufferUsage::STORAGE),
                    BufferType::Default,
                )?,
            }
        }
        for (id, access) in &self.reads {
            resolver.read_texture(&id.view("srv"), *access, None)?;
        }
        for id in &self.writes {
            resolver.write_unordered_access(&id.view("uav"), None)?;
        }
        for id in &self.render_targets {
            resolver.write_render_target(&id.view("rtv"), None)?;
        }
        Ok(())
    }

    fn dispatch(&self, storage: &GraphStorage, command_list: &mut dyn CommandList) {
        let referenced = self
            .reads
            .iter()
            .map(|(id, _)| id)
            .chain(self.writes.iter())
            .chain(self.render_targets.iter());
        for id in referenced {
            assert!(
                storage.get_resource(id).is_some(),
                "'{}' dispatched without '{}'",
                self.name,
                id
            );
        }
        command_list.dispatch(1, 1, 1);
    }
}

/// GPU object created for a resource, found through its label.
#[allow(dead_code)]
pub fn gpu_by_label(backend: &DummyBackend, name: &str) -> Option<GpuResourceHandle> {
    backend.created().iter().rev().copied().find(|handle| {
        let label = match backend.resource(*handle) {
            Some(DummyResource::Texture(desc)) => desc.label.as_deref(),
            Some(DummyResource::Buffer(desc, _)) => desc.label.as_deref(),
            None => None,
        };
        label == Some(name)
    })
}

/// Names of submitted lists, barrier lists included.
#[allow(dead_code)]
pub fn submitted_names(backend: &DummyBackend) -> Vec<String> {
    backend
        .submitted()
        .iter()
        .map(|list| list.name().to_string())
        .collect()
}

/// Level of every scheduled pass, by registration index.
#[allow(dead_code)]
pub fn pass_levels(graph: &RenderGraph<DummyBackend>) -> Vec<Option<usize>> {
    let compiled = graph.compiled().expect("graph is compiled");
    (0..graph.pass_count())
        .map(|pass| compiled.level_of(pass))
        .collect()
}
