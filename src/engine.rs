//! The owned context that replaces the source's process-wide `syscheck`
//! blob and `_base_line` static (§9 design note: global mutable state ->
//! owned context). Every thread contributed by the embedding process
//! (scheduler, realtime notifier, whodata reader, intake helpers) operates
//! on a shared `&Engine`; the engine itself schedules nothing.

use crate::attr_probe::{NameResolver, NoopNameResolver, Prefilter};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::diff::ContentDiffStore;
use crate::entry::DetectionMode;
use crate::error::EngineError;
use crate::event::{Event, EventSink, ScanMarkerData};
use crate::matcher::{FsTypeResolver, Matcher, default_fs_type_resolver};
use crate::mode_gate;
use crate::root_resolver::RootResolver;
use crate::walker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub catalog_size_before: usize,
    pub catalog_size_after: usize,
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: Catalog,
    pub(crate) matchers: Vec<Matcher>,
    pub(crate) root_resolver: RootResolver,
    pub(crate) name_resolver: Box<dyn NameResolver>,
    pub(crate) fs_type_resolver: Box<dyn FsTypeResolver>,
    pub(crate) prefilter: Option<Box<dyn Prefilter>>,
    pub(crate) content_diff: Option<Box<dyn ContentDiffStore>>,
    sink: Box<dyn EventSink>,
    scan_lock: Mutex<()>,
    pub(crate) stop_requested: AtomicBool,
    baseline_established: AtomicBool,
}

impl Engine {
    /// Builds an engine for `config`, with no name resolution, the
    /// platform's default filesystem-type resolution (`/proc/mounts` on
    /// Linux, none elsewhere), no prefilter and no content-diff store. Use
    /// the `with_*` setters to supply real collaborators before the first
    /// `scan_once`.
    pub fn new(config: EngineConfig, sink: Box<dyn EventSink>) -> Result<Engine, EngineError> {
        let matchers = config
            .roots
            .iter()
            .map(|root| {
                Matcher::new(
                    config.global.ignore_prefixes.clone(),
                    &config.global.ignore_regex,
                    root.restrict_regex.as_deref(),
                    config.global.skip_fs.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let root_resolver = RootResolver::new(&config.roots);

        Ok(Engine {
            config,
            catalog: Catalog::new(),
            matchers,
            root_resolver,
            name_resolver: Box::new(NoopNameResolver),
            fs_type_resolver: default_fs_type_resolver(),
            prefilter: None,
            content_diff: None,
            sink,
            scan_lock: Mutex::new(()),
            stop_requested: AtomicBool::new(false),
            baseline_established: AtomicBool::new(false),
        })
    }

    pub fn with_name_resolver(mut self, resolver: Box<dyn NameResolver>) -> Self {
        self.name_resolver = resolver;
        self
    }

    pub fn with_fs_type_resolver(mut self, resolver: Box<dyn FsTypeResolver>) -> Self {
        self.fs_type_resolver = resolver;
        self
    }

    pub fn with_prefilter(mut self, prefilter: Box<dyn Prefilter>) -> Self {
        self.prefilter = Some(prefilter);
        self
    }

    pub fn with_content_diff_store(mut self, store: Box<dyn ContentDiffStore>) -> Self {
        self.content_diff = Some(store);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn baseline_established(&self) -> bool {
        self.baseline_established.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    pub(crate) fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Sends an `Event::Event` to the sink unless the baseline has not yet
    /// been established (§4.7 baseline gate; §8 property 4): suppressed
    /// events are still fully constructed, just not forwarded. `scan_start`
    /// / `scan_end` markers bypass this gate entirely (sent unconditionally
    /// from `scan_once`).
    pub(crate) fn forward(&self, event: Event) {
        if self.baseline_established.load(Ordering::Relaxed) {
            self.sink.send(&event);
        }
    }

    fn root_mode_bits(&self, root_index: usize) -> crate::config::OptionFlags {
        self.config.roots[root_index].mode_bits()
    }

    /// Runs one full scheduled scan across every configured root, followed
    /// by the end-of-scan deletion reconciliation sweep (C9). Serializes
    /// against other scheduled scans via `scan_lock`.
    pub fn scan_once(&self) -> ScanStats {
        let _guard = self.scan_lock.lock().unwrap();

        let catalog_size_before = self.catalog.len();
        let start_ts = self.now();
        self.sink.send(&Event::ScanStart {
            data: ScanMarkerData {
                timestamp: start_ts,
            },
        });

        for root_index in 0..self.config.roots.len() {
            if self.stop_requested.load(Ordering::Relaxed) {
                break;
            }
            walker::scan(self, root_index);
        }

        let end_ts = self.now();
        crate::reconciler::reconcile(self, end_ts);

        self.sink.send(&Event::ScanEnd {
            data: ScanMarkerData { timestamp: end_ts },
        });

        if !self.baseline_established.load(Ordering::Relaxed) {
            self.baseline_established.store(true, Ordering::Release);
            info!("baseline established");
        }

        ScanStats {
            catalog_size_before,
            catalog_size_after: self.catalog.len(),
        }
    }

    /// Realtime intake entry point: the path carries no attribution, only
    /// its location. Propagates to every path sharing the triggering
    /// path's (dev, inode) already known to the catalog (hard-link
    /// propagation, §8 property 6).
    pub fn handle_realtime_event(&self, path: &str) {
        self.handle_path_event(path, DetectionMode::Realtime, None);
    }

    /// Whodata intake entry point: same propagation behavior as realtime,
    /// but carries originating-user/process attribution.
    pub fn handle_whodata_event(&self, path: &str, audit: crate::event::AuditInfo) {
        self.handle_path_event(path, DetectionMode::Whodata, Some(audit));
    }

    fn handle_path_event(
        &self,
        path: &str,
        mode: DetectionMode,
        audit: Option<crate::event::AuditInfo>,
    ) {
        let Some(root_index) = self.root_resolver.root_of(path, false) else {
            return;
        };
        if !mode_gate::admit(mode, self.root_mode_bits(root_index)) {
            return;
        }

        let mut paths = crate::attr_probe::stat_inode_key(std::path::Path::new(path))
            .map(|key| self.catalog.paths_for_inode(key))
            .unwrap_or_default();
        paths.insert(path.to_string());

        for sibling in paths {
            if sibling == path {
                walker::visit_with_audit(self, &sibling, mode, root_index, audit.clone());
            } else {
                walker::visit_with_audit(self, &sibling, mode, root_index, None);
            }
        }
    }
}
