//! Pure planning of source-trigger changes.

use std::collections::{HashMap, HashSet};

use jobwatch_core::SourceConfig;

/// Everything a source trigger captures when it is created. A trigger whose
/// spec differs from the stored source is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub cron: String,
    pub title: String,
    pub url: String,
    pub keywords: Vec<String>,
}

impl From<&SourceConfig> for TriggerSpec {
    fn from(source: &SourceConfig) -> Self {
        Self {
            cron: source.schedule.cron_expression(),
            title: source.title.clone(),
            url: source.url.clone(),
            keywords: source.keywords.clone(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TriggerPlan<'a> {
    pub add: Vec<&'a SourceConfig>,
    pub replace: Vec<&'a SourceConfig>,
    pub remove: Vec<i64>,
}

impl TriggerPlan<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.replace.is_empty() && self.remove.is_empty()
    }
}

/// Diff the current triggers against the stored sources.
///
/// `unparsed` holds ids of sources that exist but could not be read this
/// pass; their existing triggers are left alone.
#[must_use]
pub fn plan_source_triggers<'a>(
    current: &HashMap<i64, TriggerSpec>,
    desired: &'a [SourceConfig],
    unparsed: &HashSet<i64>,
) -> TriggerPlan<'a> {
    let mut plan = TriggerPlan::default();

    for source in desired {
        match current.get(&source.id) {
            None => plan.add.push(source),
            Some(spec) if *spec != TriggerSpec::from(source) => plan.replace.push(source),
            Some(_) => {}
        }
    }

    let wanted: HashSet<i64> = desired.iter().map(|s| s.id).collect();
    let mut remove: Vec<i64> = current
        .keys()
        .copied()
        .filter(|id| !wanted.contains(id) && !unparsed.contains(id))
        .collect();
    remove.sort_unstable();
    plan.remove = remove;

    plan
}
