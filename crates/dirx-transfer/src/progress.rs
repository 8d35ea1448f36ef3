//! Per-category transfer counters with an optional live spinner.

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dirx_config::ProgressConfig;
use dirx_core::Category;
use indicatif::{ProgressBar, ProgressStyle};

/// Redraw the live line every this many records.
const REFRESH_EVERY: u64 = 64;

#[derive(Default)]
struct Tally {
    count: AtomicU64,
    skipped: AtomicU64,
}

/// Counts records moved and records skipped, per category.
///
/// Shared by reference between the tasks of a pipeline. Each category's
/// counters are independently monotonic; no ordering is implied across them.
pub struct ProgressCounter {
    label: String,
    tallies: [Tally; 2],
    bar: Option<ProgressBar>,
}

impl ProgressCounter {
    /// Counter whose live line follows `config` and whether stderr is a
    /// terminal.
    #[must_use]
    pub fn new(label: impl Into<String>, config: &ProgressConfig) -> Self {
        let label = label.into();
        if !config.enabled(std::io::stderr().is_terminal()) {
            return Self::hidden(label);
        }

        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let counter = Self {
            label,
            tallies: Default::default(),
            bar: Some(bar),
        };
        counter.refresh();
        counter
    }

    /// Counter that never renders.
    #[must_use]
    pub fn hidden(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tallies: Default::default(),
            bar: None,
        }
    }

    const fn tally(&self, category: Category) -> &Tally {
        match category {
            Category::Objects => &self.tallies[0],
            Category::Relations => &self.tallies[1],
        }
    }

    /// One record of `category` transferred.
    pub fn inc(&self, category: Category) {
        let n = self.tally(category).count.fetch_add(1, Ordering::Relaxed) + 1;
        if n % REFRESH_EVERY == 0 {
            self.refresh();
        }
    }

    /// One record of `category` dropped for schema drift.
    pub fn skip(&self, category: Category) {
        self.tally(category).skipped.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    #[must_use]
    pub fn count(&self, category: Category) -> u64 {
        self.tally(category).count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn skipped(&self, category: Category) -> u64 {
        self.tally(category).skipped.load(Ordering::Relaxed)
    }

    /// Current totals on a single line.
    #[must_use]
    pub fn line(&self) -> String {
        let mut line = self.label.clone();
        for category in Category::ALL {
            let _ = write!(line, " {category}: {}", self.count(category));
            let skipped = self.skipped(category);
            if skipped > 0 {
                let _ = write!(line, " ({skipped} skipped)");
            }
        }
        line
    }

    /// Final totals, one category per line.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!("{}:\n", self.label);
        for category in Category::ALL {
            let _ = write!(out, "  {:<10} {:>10}", category.as_str(), self.count(category));
            let skipped = self.skipped(category);
            if skipped > 0 {
                let _ = write!(out, "  skipped {skipped} (WARNING: unknown fields)");
            }
            out.push('\n');
        }
        out
    }

    /// Clear the live line, if any.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    fn refresh(&self) {
        if let Some(bar) = &self.bar {
            bar.set_message(self.line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn categories_count_independently() {
        let progress = ProgressCounter::hidden("import");
        progress.inc(Category::Objects);
        progress.inc(Category::Objects);
        progress.inc(Category::Relations);
        progress.skip(Category::Relations);

        assert_eq!(progress.count(Category::Objects), 2);
        assert_eq!(progress.count(Category::Relations), 1);
        assert_eq!(progress.skipped(Category::Objects), 0);
        assert_eq!(progress.skipped(Category::Relations), 1);
        assert_eq!(progress.line(), "import objects: 2 relations: 1 (1 skipped)");
    }

    #[test]
    fn summary_warns_only_when_records_were_skipped() {
        let progress = ProgressCounter::hidden("export");
        progress.inc(Category::Objects);
        assert!(!progress.summary().contains("WARNING"));

        progress.skip(Category::Objects);
        let summary = progress.summary();
        assert!(summary.starts_with("export:\n"));
        assert!(summary.contains("WARNING: unknown fields"));
        assert_eq!(summary.lines().count(), 3);
    }

    #[test]
    fn counts_from_many_threads_add_up() {
        let progress = ProgressCounter::hidden("import");
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        progress.inc(Category::Relations);
                    }
                });
            }
        });
        assert_eq!(progress.count(Category::Relations), 8000);
    }

    #[test]
    fn disabled_config_never_renders() {
        let config = ProgressConfig {
            mode: dirx_config::ProgressMode::Off,
        };
        let progress = ProgressCounter::new("export", &config);
        assert!(progress.bar.is_none());
        progress.finish();
    }
}
