use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info};

use crate::config::FinderConfig;
use crate::error::{OpFinderError, Result};
use crate::filter::FilterEngine;
use crate::hierarchy::{split_path, HierarchyBuilder};
use crate::registry::RegistrySource;
use crate::simplify::{SignatureSimplifier, SimpleEligibility};
use crate::storage::{IndexMetadata, LazyAutomatonIndex};
use crate::task::{current_runtime, FilterController, FilterEvent, FilterRequest, TaskState};
use crate::types::{EntryDescriptor, TreeNode};

/// Which of the two independent hierarchy/index pairs is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Entries taking at least one simple-eligible input, shown with
    /// simplified signatures.
    #[default]
    Simple,
    /// Every entry, shown with its full signature.
    Advanced,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Simple => write!(f, "simple"),
            ViewMode::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(ViewMode::Simple),
            "advanced" => Ok(ViewMode::Advanced),
            other => Err(format!("unknown view mode '{}', expected 'simple' or 'advanced'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub records: usize,
    pub skipped: usize,
    /// Records identical to an earlier one in every displayed column.
    pub duplicates: usize,
    pub advanced_entries: usize,
    pub simple_entries: usize,
    pub load_duration_ms: u64,
}

/// What applying a [`FilterEvent`] did to the foreground state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Progress(u8),
    Installed { generation: u64, matches: usize },
    Cancelled { generation: u64 },
    /// Event from a superseded task; nothing changed.
    Discarded { generation: u64 },
}

struct View {
    hierarchy: Arc<TreeNode>,
    index: Arc<LazyAutomatonIndex>,
}

/// Foreground owner of the finder state.
///
/// Holds both views, the currently installed tree, the query and the
/// progress value. Filtering happens on worker threads; results only become
/// visible through [`OpFinder::apply_event`], called on the owning task.
pub struct OpFinder {
    config: FinderConfig,
    root: TreeNode,
    simple: View,
    advanced: View,
    mode: ViewMode,
    query: String,
    installed: Arc<TreeNode>,
    progress: u8,
    engine: FilterEngine,
    controller: FilterController,
    events: UnboundedReceiver<FilterEvent>,
    stats: RegistryStats,
}

impl OpFinder {
    pub fn builder() -> OpFinderBuilder {
        OpFinderBuilder::new()
    }

    /// Enumerate `source` once and build both hierarchies.
    pub fn from_registry(source: &dyn RegistrySource, config: FinderConfig) -> Result<Self> {
        let start_time = Instant::now();
        let config = config.normalized();
        let simplifier = SignatureSimplifier::from_config(&config.simple)?;
        let mut eligibility = SimpleEligibility::new(config.simple.eligible_types.clone());

        let hierarchy = &config.hierarchy;
        let root = TreeNode::leaf(&hierarchy.root_label, &hierarchy.root_invocation, &hierarchy.root_owner);
        let mut advanced_tree = HierarchyBuilder::new(root.clone());
        let mut simple_tree = HierarchyBuilder::new(root.clone());
        let mut advanced_entries = Vec::new();
        let mut simple_entries = Vec::new();

        let records = source.records();
        let mut stats = RegistryStats {
            records: records.len(),
            ..RegistryStats::default()
        };
        let mut seen_advanced = HashSet::new();

        for record in &records {
            let Some(name) = record.resolved_name() else {
                stats.skipped += 1;
                continue;
            };
            let namespace = record.resolved_namespace(&hierarchy.global_namespace);
            let qualified = format!("{}.{}", namespace, name);
            let mut path = split_path(&namespace);
            path.push(name.as_str());

            let signature = non_empty(&record.signature).unwrap_or(&name).to_string();
            let invocation = non_empty(&record.invocation)
                .or_else(|| non_empty(&record.signature))
                .unwrap_or(&qualified)
                .to_string();
            let owner = record.owner_type.trim();
            let advanced_key = non_empty(owner).unwrap_or(&qualified);

            let entry = EntryDescriptor::new(signature.as_str(), invocation.as_str(), owner).with_match_key(advanced_key);
            if !seen_advanced.insert(entry.clone()) {
                debug!(entry = %entry.display_name, "skipping duplicate registry entry");
                stats.duplicates += 1;
                continue;
            }
            advanced_tree.insert(&path, &entry);
            advanced_entries.push(Arc::new(entry));

            simple_tree.ensure_namespace(&path);
            let simple_name = simplifier.simplify(&signature);
            if eligibility.admit(&simple_name, &record.inputs, source) {
                let simple_entry =
                    EntryDescriptor::new(simple_name.as_str(), invocation.as_str(), owner).with_match_key(simple_name.as_str());
                simple_tree.insert(&path, &simple_entry);
                simple_entries.push(Arc::new(simple_entry));
            }
        }

        stats.advanced_entries = advanced_entries.len();
        stats.simple_entries = simple_entries.len();
        stats.load_duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            records = stats.records,
            skipped = stats.skipped,
            duplicates = stats.duplicates,
            advanced = stats.advanced_entries,
            simple = stats.simple_entries,
            duration_ms = stats.load_duration_ms,
            "registry enumerated"
        );

        let advanced = View {
            hierarchy: Arc::new(advanced_tree.build()),
            index: Arc::new(LazyAutomatonIndex::new(
                advanced_entries,
                config.index.advanced_delimiter_chars(),
            )),
        };
        let simple = View {
            hierarchy: Arc::new(simple_tree.build()),
            index: Arc::new(LazyAutomatonIndex::new(simple_entries, config.index.simple_delimiter_chars())),
        };

        let mode = config.view.default_mode;
        let installed = match mode {
            ViewMode::Simple => Arc::clone(&simple.hierarchy),
            ViewMode::Advanced => Arc::clone(&advanced.hierarchy),
        };
        let (tx, rx) = unbounded_channel();

        Ok(Self {
            engine: FilterEngine::from_config(&config.filter),
            config,
            root,
            simple,
            advanced,
            mode,
            query: String::new(),
            installed,
            progress: 0,
            controller: FilterController::new(tx),
            events: rx,
            stats,
        })
    }

    fn view(&self, mode: ViewMode) -> &View {
        match mode {
            ViewMode::Simple => &self.simple,
            ViewMode::Advanced => &self.advanced,
        }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    pub fn task_state(&self) -> TaskState {
        self.controller.state()
    }

    pub fn is_filtering(&self) -> bool {
        self.controller.is_running()
    }

    /// The tree currently visible to the presentation layer.
    pub fn installed_tree(&self) -> Arc<TreeNode> {
        Arc::clone(&self.installed)
    }

    /// The unfiltered hierarchy of `mode`.
    pub fn hierarchy(&self, mode: ViewMode) -> Arc<TreeNode> {
        Arc::clone(&self.view(mode).hierarchy)
    }

    /// Index statistics, once the view's index has been built.
    pub fn index_metadata(&self, mode: ViewMode) -> Option<IndexMetadata> {
        self.view(mode).index.get().map(|index| index.metadata().clone())
    }

    /// Replace the query. A non-empty query starts a background filter run
    /// and returns its generation; an empty one cancels any run and restores
    /// the unfiltered hierarchy immediately.
    ///
    /// Fails with [`OpFinderError::NoRuntime`] outside a tokio runtime, in
    /// which case nothing changes.
    pub fn submit_query(&mut self, text: &str) -> Result<Option<u64>> {
        if !text.is_empty() {
            current_runtime()?;
        }
        self.query = text.to_string();
        self.controller.cancel();
        self.progress = 0;

        if text.is_empty() {
            self.installed = self.hierarchy(self.mode);
            debug!(mode = %self.mode, "query cleared, restored hierarchy");
            return Ok(None);
        }

        let view = self.view(self.mode);
        let request = FilterRequest {
            query: text.to_string(),
            index: Arc::clone(&view.index),
            root: self.root.clone(),
            engine: self.engine,
        };
        self.controller.submit(request).map(Some)
    }

    /// Switch views. The views are filtered independently, so an active
    /// query is re-run against the new view. Returns false when `mode` is
    /// already active.
    pub fn set_mode(&mut self, mode: ViewMode) -> Result<bool> {
        if mode == self.mode {
            return Ok(false);
        }
        info!(from = %self.mode, to = %mode, "switching view mode");
        let previous = std::mem::replace(&mut self.mode, mode);
        let query = self.query.clone();
        if let Err(err) = self.submit_query(&query) {
            self.mode = previous;
            return Err(err);
        }
        Ok(true)
    }

    /// Apply one worker event. Only events of the current task change state.
    pub fn apply_event(&mut self, event: FilterEvent) -> Update {
        let generation = event.generation();
        match event {
            // A cancelled task was already detached by `FilterController::cancel`.
            FilterEvent::Cancelled { generation } => Update::Cancelled { generation },
            _ if !self.controller.is_current(generation) => {
                debug!(generation, current = self.controller.generation(), "discarding stale filter event");
                Update::Discarded { generation }
            }
            FilterEvent::Progress { percent, .. } => {
                self.progress = percent;
                Update::Progress(percent)
            }
            FilterEvent::Finished { tree, matches, best_score, .. } => {
                self.installed = tree;
                self.progress = 100;
                self.controller.finish(generation);
                debug!(generation, matches, ?best_score, "installed filtered tree");
                Update::Installed { generation, matches }
            }
        }
    }

    /// Apply every event already queued without waiting.
    pub fn poll_updates(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            updates.push(self.apply_event(event));
        }
        updates
    }

    /// Wait for the next worker event and apply it.
    pub async fn next_update(&mut self) -> Result<Update> {
        let event = self.events.recv().await.ok_or(OpFinderError::ChannelClosed)?;
        Ok(self.apply_event(event))
    }

    /// Apply events until no filter task is current, then return the
    /// installed tree.
    pub async fn settle(&mut self) -> Result<Arc<TreeNode>> {
        while self.controller.is_running() {
            self.next_update().await?;
        }
        Ok(self.installed_tree())
    }

    /// Build the automaton index of `mode` now instead of on first filter.
    pub async fn warm_index(&self, mode: ViewMode) -> Result<IndexMetadata> {
        let index = Arc::clone(&self.view(mode).index);
        tokio::task::spawn_blocking(move || index.get_or_build().metadata().clone())
            .await
            .map_err(OpFinderError::from)
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Builder mirroring the configuration knobs most callers touch.
#[derive(Default)]
pub struct OpFinderBuilder {
    config: FinderConfig,
    source: Option<Arc<dyn RegistrySource>>,
}

impl OpFinderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: FinderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, source: Arc<dyn RegistrySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn keep(mut self, keep: usize) -> Self {
        self.config.filter.keep = keep;
        self
    }

    pub fn progress_step(mut self, step: u8) -> Self {
        self.config.filter.progress_step = step;
        self
    }

    pub fn mode(mut self, mode: ViewMode) -> Self {
        self.config.view.default_mode = mode;
        self
    }

    pub fn eligible_types(mut self, types: Vec<String>) -> Self {
        self.config.simple.eligible_types = types;
        self
    }

    pub fn global_namespace(mut self, label: impl Into<String>) -> Self {
        self.config.hierarchy.global_namespace = label.into();
        self
    }

    pub fn build(self) -> Result<OpFinder> {
        let source = self
            .source
            .ok_or_else(|| OpFinderError::Registry("No registry source configured".to_string()))?;
        OpFinder::from_registry(source.as_ref(), self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InputSpec, MockRegistrySource, OpRecord, StaticRegistry};

    fn registry() -> StaticRegistry {
        StaticRegistry::new(vec![
            OpRecord::new("gauss")
                .with_namespace("filter")
                .with_signature("Img out = gauss(Img in, double sigma)")
                .with_owner_type("net.imagej.ops.filter.gauss.DefaultGauss")
                .with_invocation("ops.filter().gauss(in, sigma)")
                .with_input(InputSpec::new("Img"))
                .with_input(InputSpec::new("double")),
            OpRecord::new("add")
                .with_namespace("math")
                .with_signature("double out = add(double a, double b)")
                .with_owner_type("net.imagej.ops.math.AddDoubles")
                .with_invocation("ops.math().add(a, b)")
                .with_input(InputSpec::new("double"))
                .with_input(InputSpec::new("double")),
            OpRecord::new("").with_fallback_name(""),
            OpRecord::new("identity")
                .with_signature("Img out = identity(ArrayImg in)")
                .with_owner_type("net.imagej.ops.Identity")
                .with_input(InputSpec::new("ArrayImg")),
        ])
        .with_supertype("ArrayImg", "Img")
    }

    fn finder(mode: ViewMode) -> OpFinder {
        OpFinder::builder()
            .registry(Arc::new(registry()))
            .mode(mode)
            .build()
            .unwrap()
    }

    fn child<'a>(node: &'a TreeNode, label: &str) -> &'a TreeNode {
        node.children()
            .iter()
            .find(|c| c.label == label)
            .unwrap_or_else(|| panic!("no child {}", label))
    }

    #[test]
    fn test_view_mode_parsing() {
        assert_eq!("Simple".parse::<ViewMode>().unwrap(), ViewMode::Simple);
        assert_eq!(" advanced ".parse::<ViewMode>().unwrap(), ViewMode::Advanced);
        assert!("fancy".parse::<ViewMode>().is_err());
        assert_eq!(ViewMode::Advanced.to_string(), "advanced");
    }

    #[test]
    fn test_builder_requires_registry() {
        let result = OpFinder::builder().build();
        assert!(matches!(result, Err(OpFinderError::Registry(_))));
    }

    #[test]
    fn test_stats_count_skipped_records() {
        let finder = finder(ViewMode::Advanced);
        let stats = finder.stats();
        assert_eq!(stats.records, 4);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.advanced_entries, 3);
        assert_eq!(stats.simple_entries, 2);
    }

    #[test]
    fn test_advanced_hierarchy_layout() {
        let finder = finder(ViewMode::Advanced);
        let tree = finder.hierarchy(ViewMode::Advanced);
        assert_eq!(tree.label, "ops");

        let labels: Vec<&str> = tree.children().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["(global)", "filter", "math"]);

        let gauss = child(child(&tree, "filter"), "gauss");
        let leaf = &gauss.children()[0];
        assert_eq!(leaf.label, "Img out = gauss(Img in, double sigma)");
        assert_eq!(leaf.invocation, "ops.filter().gauss(in, sigma)");
        assert_eq!(leaf.owner_type, "net.imagej.ops.filter.gauss.DefaultGauss");
    }

    #[test]
    fn test_missing_invocation_falls_back_to_signature() {
        let finder = finder(ViewMode::Advanced);
        let tree = finder.hierarchy(ViewMode::Advanced);
        let identity = &child(child(&tree, "(global)"), "identity").children()[0];
        assert_eq!(identity.invocation, "Img out = identity(ArrayImg in)");
    }

    #[test]
    fn test_simple_hierarchy_is_pruned() {
        let finder = finder(ViewMode::Simple);
        let tree = finder.hierarchy(ViewMode::Simple);

        let labels: Vec<&str> = tree.children().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["(global)", "filter"]);
        let gauss = child(child(&tree, "filter"), "gauss");
        assert_eq!(gauss.children()[0].label, "gauss(Image in, Number sigma)");

        tree.walk(|_, node| assert!(node.is_entry() || !node.children().is_empty()));
    }

    #[test]
    fn test_installed_tree_matches_default_mode() {
        let finder = finder(ViewMode::Simple);
        assert_eq!(finder.mode(), ViewMode::Simple);
        assert!(Arc::ptr_eq(&finder.installed_tree(), &finder.hierarchy(ViewMode::Simple)));
        assert!(finder.index_metadata(ViewMode::Simple).is_none());
    }

    #[test]
    fn test_bare_record_invocation_uses_qualified_name() {
        let registry = StaticRegistry::new(vec![OpRecord::new("noop").with_namespace("misc")]);
        let finder = OpFinder::builder()
            .registry(Arc::new(registry))
            .mode(ViewMode::Advanced)
            .build()
            .unwrap();
        let tree = finder.hierarchy(ViewMode::Advanced);
        let leaf = &child(child(&tree, "misc"), "noop").children()[0];
        assert_eq!(leaf.label, "noop");
        assert_eq!(leaf.invocation, "misc.noop");
    }

    #[test]
    fn test_duplicate_records_are_counted() {
        let gauss = OpRecord::new("gauss")
            .with_namespace("filter")
            .with_signature("Img out = gauss(Img in)")
            .with_owner_type("net.imagej.ops.filter.gauss.DefaultGauss")
            .with_input(InputSpec::new("Img"));
        let registry = StaticRegistry::new(vec![gauss.clone(), gauss]);
        let finder = OpFinder::builder().registry(Arc::new(registry)).build().unwrap();

        assert_eq!(finder.stats().records, 2);
        assert_eq!(finder.stats().duplicates, 1);
        assert_eq!(finder.stats().advanced_entries, 1);
        assert_eq!(finder.hierarchy(ViewMode::Advanced).entries().len(), 1);
    }

    #[test]
    fn test_failed_submit_leaves_state_untouched() {
        let mut finder = finder(ViewMode::Advanced);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            finder.submit_query("DefaultGauss").unwrap();
            finder.settle().await.unwrap();
        });
        let filtered = finder.installed_tree();

        let err = finder.submit_query("add").unwrap_err();
        assert!(matches!(err, OpFinderError::NoRuntime));
        assert_eq!(finder.query(), "DefaultGauss");
        assert_eq!(finder.progress(), 100);
        assert!(Arc::ptr_eq(&finder.installed_tree(), &filtered));

        let err = finder.set_mode(ViewMode::Simple).unwrap_err();
        assert!(matches!(err, OpFinderError::NoRuntime));
        assert_eq!(finder.mode(), ViewMode::Advanced);
        assert_eq!(finder.query(), "DefaultGauss");
    }

    #[test]
    fn test_registry_enumerated_once() {
        let mut mock = MockRegistrySource::new();
        mock.expect_records()
            .times(1)
            .returning(|| vec![OpRecord::new("noop").with_signature("noop()")]);
        mock.expect_is_assignable().returning(|_, _| false);

        let finder = OpFinder::from_registry(&mock, FinderConfig::default()).unwrap();
        assert_eq!(finder.stats().advanced_entries, 1);
        assert_eq!(finder.stats().simple_entries, 0);
    }

    #[test]
    fn test_empty_query_restores_without_runtime() {
        let mut finder = finder(ViewMode::Advanced);
        assert_eq!(finder.submit_query("").unwrap(), None);
        assert_eq!(*finder.installed_tree(), *finder.hierarchy(ViewMode::Advanced));
        assert_eq!(finder.progress(), 0);
    }

    #[tokio::test]
    async fn test_filter_installs_flat_result() {
        let mut finder = finder(ViewMode::Advanced);
        let generation = finder.submit_query("DefaultGauss").unwrap();
        assert!(generation.is_some());

        let tree = finder.settle().await.unwrap();
        assert_eq!(tree.label, "ops");
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].label, "Img out = gauss(Img in, double sigma)");
        assert_eq!(finder.progress(), 100);
        assert_eq!(finder.task_state(), TaskState::Completed);
        assert!(finder.index_metadata(ViewMode::Advanced).is_some());
    }

    #[tokio::test]
    async fn test_set_mode_refilters_active_query() {
        let mut finder = finder(ViewMode::Advanced);
        finder.submit_query("add").unwrap();
        finder.settle().await.unwrap();

        assert!(finder.set_mode(ViewMode::Simple).unwrap());
        assert!(!finder.set_mode(ViewMode::Simple).unwrap());
        assert_eq!(finder.query(), "add");

        let tree = finder.settle().await.unwrap();
        assert!(tree
            .children()
            .iter()
            .all(|c| c.label != "double out = add(double a, double b)"));
        assert!(finder.index_metadata(ViewMode::Simple).is_some());
    }

    #[tokio::test]
    async fn test_set_mode_without_query_swaps_hierarchy() {
        let mut finder = finder(ViewMode::Simple);
        assert!(finder.set_mode(ViewMode::Advanced).unwrap());
        assert!(!finder.is_filtering());
        assert!(Arc::ptr_eq(&finder.installed_tree(), &finder.hierarchy(ViewMode::Advanced)));
    }

    #[tokio::test]
    async fn test_stale_events_are_discarded() {
        let mut finder = finder(ViewMode::Advanced);
        let stale = finder.submit_query("gauss").unwrap().unwrap();
        let current = finder.submit_query("add").unwrap().unwrap();

        let update = finder.apply_event(FilterEvent::Finished {
            generation: stale,
            tree: Arc::new(TreeNode::namespace("stale")),
            matches: 0,
            best_score: None,
        });
        assert_eq!(update, Update::Discarded { generation: stale });
        assert_ne!(finder.installed_tree().label, "stale");

        let tree = finder.settle().await.unwrap();
        assert_eq!(finder.controller.generation(), current);
        assert_eq!(tree.children()[0].label, "double out = add(double a, double b)");
    }

    #[tokio::test]
    async fn test_cancelled_events_change_nothing() {
        let mut finder = finder(ViewMode::Advanced);
        let generation = finder.submit_query("gauss").unwrap().unwrap();

        let update = finder.apply_event(FilterEvent::Cancelled { generation });
        assert_eq!(update, Update::Cancelled { generation });
        assert!(finder.is_filtering());

        finder.settle().await.unwrap();
        assert_eq!(finder.task_state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_warm_index_builds_eagerly() {
        let finder = finder(ViewMode::Advanced);
        let metadata = finder.warm_index(ViewMode::Advanced).await.unwrap();
        assert_eq!(metadata.total_entries, 3);
        assert_eq!(finder.index_metadata(ViewMode::Advanced), Some(metadata));
    }
}
