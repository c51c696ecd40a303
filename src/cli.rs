use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

// Use crate imports since we're within the same crate
use crate::{
    cli_types::{SearchArgs, TreeArgs},
    config::FinderConfig,
    finder::{OpFinder, Update, ViewMode},
    registry::{RegistrySource, StaticRegistry},
    types::TreeNode,
};

const INDENT: usize = 2;

pub struct CliApp {
    finder: OpFinder,
    verbose: bool,
}

impl CliApp {
    pub async fn new(config: FinderConfig, registry_path: &Path, verbose: bool, colors_enabled: bool) -> Result<Self> {
        info!("Initializing opfinder CLI");

        let path = registry_path.to_path_buf();
        let registry = tokio::task::spawn_blocking(move || StaticRegistry::from_json_file(&path))
            .await
            .context("Registry loader panicked")?
            .with_context(|| format!("Failed to load registry: {}", registry_path.display()))?;

        Self::from_source(config, Arc::new(registry), verbose, colors_enabled)
    }

    pub fn from_source(
        config: FinderConfig,
        source: Arc<dyn RegistrySource>,
        verbose: bool,
        colors_enabled: bool,
    ) -> Result<Self> {
        if !colors_enabled {
            colored::control::set_override(false);
        }

        let finder = OpFinder::builder()
            .config(config)
            .registry(source)
            .build()
            .context("Failed to build operation hierarchy")?;

        Ok(Self { finder, verbose })
    }

    pub fn finder(&self) -> &OpFinder {
        &self.finder
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.finder
            .set_mode(mode)
            .with_context(|| format!("Failed to switch to {} view", mode))?;
        Ok(())
    }

    pub async fn tree(&self, args: TreeArgs) -> Result<()> {
        self.print_header(&format!("Operations ({} view)", self.finder.mode()));

        let tree = self.finder.installed_tree();
        if args.json {
            let json = serde_json::to_string_pretty(tree.as_ref()).context("Failed to serialize tree to JSON")?;
            println!("{}", json);
        } else {
            print!("{}", render_tree(&tree, args.depth));
        }

        if self.verbose {
            self.print_info(&format!("{} entries", tree.entries().len()));
        }

        Ok(())
    }

    /// Run each query in order. Earlier queries are superseded as soon as the
    /// next one is submitted; only the last one is waited for.
    pub async fn search(&mut self, args: SearchArgs) -> Result<()> {
        self.print_header("Search");
        let start_time = Instant::now();

        let output = self.run_search(&args).await?;
        print!("{}", output);

        if self.verbose {
            self.print_info(&format!("Search completed in {:?}", start_time.elapsed()));
        }

        Ok(())
    }

    /// Submit the queries, wait for the last one and render what ended up
    /// installed. An empty last query renders the restored hierarchy.
    async fn run_search(&mut self, args: &SearchArgs) -> Result<String> {
        let Some((last, earlier)) = args.queries.split_last() else {
            return Ok(warning_line("No query given."));
        };

        for query in earlier {
            if self.verbose {
                self.print_info(&format!("Query: {} (superseded)", query));
            }
            self.finder.submit_query(query).context("Failed to start filter")?;
        }

        if self.verbose {
            self.print_info(&format!("Query: {}", last));
        }
        let generation = self.finder.submit_query(last).context("Failed to start filter")?;

        let mut matches = 0;
        if generation.is_some() {
            let progress = ProgressBar::new(100);
            progress.set_style(
                ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .context("Invalid progress template")?
                    .progress_chars("#>-"),
            );
            progress.set_message(last.clone());

            while self.finder.is_filtering() {
                match self.finder.next_update().await.context("Filter task stopped unexpectedly")? {
                    Update::Progress(percent) => progress.set_position(u64::from(percent)),
                    Update::Installed { matches: found, .. } => matches = found,
                    Update::Cancelled { .. } | Update::Discarded { .. } => {}
                }
            }
            progress.finish_and_clear();
        }

        let tree = self.finder.installed_tree();
        if args.json {
            let mut json = serde_json::to_string_pretty(tree.as_ref()).context("Failed to serialize results to JSON")?;
            json.push('\n');
            Ok(json)
        } else if generation.is_some() && matches == 0 {
            Ok(warning_line(&format!("No operations match '{}'", last)))
        } else {
            Ok(render_tree(&tree, None))
        }
    }

    pub async fn stats(&self) -> Result<()> {
        self.print_header("Registry Statistics");

        let stats = self.finder.stats();
        println!("  {:<18} {}", "records:", stats.records);
        println!("  {:<18} {}", "skipped:", stats.skipped);
        println!("  {:<18} {}", "duplicates:", stats.duplicates);
        println!("  {:<18} {}", "advanced entries:", stats.advanced_entries);
        println!("  {:<18} {}", "simple entries:", stats.simple_entries);
        println!("  {:<18} {}ms", "load time:", stats.load_duration_ms);

        for mode in [ViewMode::Simple, ViewMode::Advanced] {
            let metadata = self
                .finder
                .warm_index(mode)
                .await
                .with_context(|| format!("Failed to build {} index", mode))?;
            println!(
                "  {:<18} {} keywords, {} states, built in {}ms",
                format!("{} index:", mode),
                metadata.total_keywords,
                metadata.total_states,
                metadata.build_duration_ms
            );
        }

        Ok(())
    }

    pub async fn show_config(&self) -> Result<()> {
        self.print_header("Configuration");

        let config_toml = self
            .finder
            .config()
            .to_toml_string()
            .context("Failed to serialize configuration")?;
        println!("{}", config_toml);

        if let Some(path) = FinderConfig::user_config_path() {
            self.print_info(&format!("User config file: {}", path.display()));
        }

        Ok(())
    }

    // Utility methods for consistent output formatting
    fn print_header(&self, title: &str) {
        println!("{}", title.bold().underline());
    }

    fn print_info(&self, message: &str) {
        println!("{} {}", "info:".cyan(), message);
    }
}

fn warning_line(message: &str) -> String {
    format!("{} {}\n", "warning:".yellow(), message)
}

const HEADERS: [&str; 3] = ["Op signature", "Code to use", "Defined in class"];

/// Render `tree` as aligned columns under a header row: indented label,
/// invocation, owner type.
pub fn render_tree(tree: &TreeNode, max_depth: Option<usize>) -> String {
    let widths = tree.column_widths();
    let invocation_width = widths.invocation.max(HEADERS[1].len());
    let mut label_width = HEADERS[0].len();
    tree.walk(|depth, node| {
        if max_depth.map_or(true, |max| depth <= max) {
            label_width = label_width.max(depth * INDENT + node.label.chars().count());
        }
    });

    let mut out = format!(
        "{:<lw$}  {:<iw$}  {}",
        HEADERS[0],
        HEADERS[1],
        HEADERS[2],
        lw = label_width,
        iw = invocation_width
    )
    .bold()
    .to_string();
    out.push('\n');

    tree.walk(|depth, node| {
        if max_depth.is_some_and(|max| depth > max) {
            return;
        }
        let label = format!("{:indent$}{}", "", node.label, indent = depth * INDENT);
        let label = format!("{:<width$}", label, width = label_width);
        let label = if node.is_namespace() { label.bold().blue() } else { label.normal() };
        let invocation = format!("{:<width$}", node.invocation, width = invocation_width);

        let line = format!("{}  {}  {}", label, invocation.green(), node.owner_type.dimmed());
        out.push_str(line.trim_end());
        out.push('\n');
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InputSpec, OpRecord};
    use std::fs;
    use tempfile::TempDir;
    use tokio::test;

    fn create_test_registry() -> StaticRegistry {
        StaticRegistry::new(vec![
            OpRecord::new("gauss")
                .with_namespace("filter")
                .with_signature("Img out = gauss(Img in, double sigma)")
                .with_owner_type("net.imagej.ops.filter.gauss.DefaultGauss")
                .with_invocation("ops.filter().gauss(in, sigma)")
                .with_input(InputSpec::new("Img")),
            OpRecord::new("add")
                .with_namespace("math")
                .with_signature("double out = add(double a, double b)")
                .with_owner_type("net.imagej.ops.math.AddDoubles")
                .with_input(InputSpec::new("double")),
        ])
    }

    fn create_test_app(mode: ViewMode) -> CliApp {
        let mut config = FinderConfig::default();
        config.view.default_mode = mode;
        CliApp::from_source(config, Arc::new(create_test_registry()), false, false).unwrap()
    }

    #[test]
    async fn test_cli_app_from_registry_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ops.json");
        fs::write(&path, serde_json::to_string(&create_test_registry()).unwrap()).unwrap();

        let app = CliApp::new(FinderConfig::default(), &path, false, false).await;
        assert!(app.is_ok());
        assert_eq!(app.unwrap().finder().stats().records, 2);
    }

    #[test]
    async fn test_cli_app_missing_registry() {
        let temp_dir = TempDir::new().unwrap();
        let result = CliApp::new(FinderConfig::default(), &temp_dir.path().join("missing.json"), false, false).await;
        assert!(result.is_err());
    }

    #[test]
    async fn test_search_installs_best_match() {
        let mut app = create_test_app(ViewMode::Advanced);
        let args = SearchArgs {
            queries: vec!["math".to_string(), "AddDoubles".to_string()],
            json: false,
        };

        app.search(args).await.unwrap();
        let tree = app.finder().installed_tree();
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].label, "double out = add(double a, double b)");
    }

    #[test]
    async fn test_empty_search_renders_hierarchy() {
        colored::control::set_override(false);
        let mut app = create_test_app(ViewMode::Advanced);
        let args = SearchArgs {
            queries: vec!["gauss".to_string(), String::new()],
            json: false,
        };

        let output = app.run_search(&args).await.unwrap();
        assert!(!output.contains("No operations match"));
        assert!(output.lines().any(|line| line.trim_start().starts_with("filter")));
        assert!(output.lines().any(|line| line.trim_start().starts_with("math")));
        assert_eq!(*app.finder().installed_tree(), *app.finder().hierarchy(ViewMode::Advanced));
        assert!(app.search(args).await.is_ok());
    }

    #[test]
    async fn test_tree_and_stats_commands() {
        let mut app = create_test_app(ViewMode::Simple);
        assert!(app.tree(TreeArgs::default()).await.is_ok());
        assert!(app.stats().await.is_ok());
        assert!(app.finder().index_metadata(ViewMode::Advanced).is_some());

        app.set_mode(ViewMode::Advanced).unwrap();
        assert_eq!(app.finder().mode(), ViewMode::Advanced);
    }

    #[test]
    async fn test_config_display() {
        let app = create_test_app(ViewMode::Simple);
        assert!(app.show_config().await.is_ok());
    }

    #[test]
    async fn test_render_tree_aligns_columns() {
        colored::control::set_override(false);
        let mut root = TreeNode::leaf("ops", "# ops", "OpService");
        let mut math = TreeNode::namespace("math");
        math.add(TreeNode::leaf("add", "ops.math().add(a, b)", "AddDoubles"));
        root.add(math);

        let rendered = render_tree(&root, None);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Op signature"));
        assert!(lines[1].starts_with("ops"));
        assert!(lines[2].starts_with("  math"));
        assert!(lines[3].starts_with("    add"));

        let column = lines[0].find("Code to use").unwrap();
        assert_eq!(lines[1].find("# ops").unwrap(), column);
        assert_eq!(lines[3].find("ops.math()").unwrap(), column);

        let shallow = render_tree(&root, Some(1));
        assert_eq!(shallow.lines().count(), 3);
    }
}
