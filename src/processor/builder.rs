//! Processor construction

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::context::StorageContext;
use crate::error::{AtlasError, Result};
use crate::flush::FlushHandle;
use crate::memtable::MemTable;
use crate::storage::{DurableWriter, FileSchema, ResourceList, TsFileWriter};
use crate::version::{FileVersionController, VersionController};

use super::{Buffers, BufferWriteProcessor, Callbacks, Shared, LOG_NODE_SUFFIX};

/// Builder for [`BufferWriteProcessor`]
///
/// # Example
/// ```no_run
/// use atlasts::{BufferWriteProcessor, Config, StorageContext};
///
/// let ctx = StorageContext::new(Config::builder().data_dir("./data").build())?;
/// let processor = BufferWriteProcessor::builder(&ctx, "root.sg1")
///     .file_name("0001.tsfile")
///     .open()?;
/// # Ok::<(), atlasts::AtlasError>(())
/// ```
pub struct ProcessorBuilder<'a> {
    ctx: &'a StorageContext,
    name: String,
    file_name: Option<String>,
    schema: FileSchema,
    callbacks: Callbacks,
    version_controller: Option<Arc<dyn VersionController>>,
    resources: Option<ResourceList>,
    writer: Option<Arc<dyn DurableWriter>>,
}

impl<'a> ProcessorBuilder<'a> {
    pub fn new(ctx: &'a StorageContext, name: impl Into<String>) -> Self {
        Self {
            ctx,
            name: name.into(),
            file_name: None,
            schema: FileSchema::new(),
            callbacks: Callbacks::default(),
            version_controller: None,
            resources: None,
            writer: None,
        }
    }

    /// Durable file name inside the processor directory (default: creation ms)
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn schema(mut self, schema: FileSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Share a version sequence (default: reservation files in the processor directory)
    pub fn version_controller(mut self, controller: Arc<dyn VersionController>) -> Self {
        self.version_controller = Some(controller);
        self
    }

    /// List the closed file is published to
    pub fn resources(mut self, resources: ResourceList) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Replace the default durable file writer
    pub fn writer(mut self, writer: Arc<dyn DurableWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Create the processor directory, open the durable file and the WAL
    /// node, then replay what the WAL still holds
    pub fn open(self) -> Result<BufferWriteProcessor> {
        let name = self.name;
        let construction = |e: AtlasError| AtlasError::Construction {
            name: name.clone(),
            reason: e.to_string(),
        };

        let config = self.ctx.config();
        let base_dir = config.data_dir.clone();
        let processor_dir = base_dir.join(&name);
        if !processor_dir.exists() {
            fs::create_dir_all(&processor_dir).map_err(|e| construction(e.into()))?;
            tracing::debug!(processor = %name, dir = %processor_dir.display(), "created processor directory");
        }

        let file_name = self.file_name.unwrap_or_else(|| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            format!("{}.tsfile", millis)
        });
        let insert_file = processor_dir.join(file_name);

        let writer: Arc<dyn DurableWriter> = match self.writer {
            Some(writer) => writer,
            None => Arc::new(TsFileWriter::open(&insert_file).map_err(construction)?),
        };

        let version_controller: Arc<dyn VersionController> = match self.version_controller {
            Some(controller) => controller,
            None => Arc::new(
                FileVersionController::open(&processor_dir, config.version_save_interval)
                    .map_err(construction)?,
            ),
        };

        let log_node = match self.ctx.wal_manager() {
            Some(manager) => Some(
                manager
                    .get_node(&format!("{}{}", name, LOG_NODE_SUFFIX))
                    .map_err(construction)?,
            ),
            None => None,
        };

        let mem_controller = Arc::clone(self.ctx.mem_controller());
        let mem_owner = mem_controller.register(&name);

        let shared = Arc::new(Shared {
            name: name.clone(),
            buffers: RwLock::new(Buffers {
                work: MemTable::new(),
                flush: None,
            }),
            writer,
            log_node: log_node.clone(),
            callbacks: self.callbacks,
            mem_controller,
            mem_owner,
            mem_size: AtomicU64::new(0),
            pending_values: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            failure_policy: config.flush_failure_policy,
        });

        let processor = BufferWriteProcessor {
            shared,
            flush_lock: Mutex::new(()),
            flush_handle: Mutex::new(FlushHandle::ready(true)),
            flush_pool: Arc::clone(self.ctx.flush_pool()),
            version_controller,
            schema: self.schema,
            resources: self.resources.unwrap_or_default(),
            base_dir,
            insert_file,
            memtable_threshold: config.memtable_size_threshold,
            last_flush_time: AtomicI64::new(-1),
            closed: AtomicBool::new(false),
        };

        if let Some(node) = &log_node {
            processor.replay_log(node).map_err(construction)?;
        }

        tracing::info!(
            processor = %name,
            file = %processor.insert_file.display(),
            wal = log_node.is_some(),
            "opened processor"
        );
        Ok(processor)
    }
}
