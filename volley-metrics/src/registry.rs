use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug, Clone, Copy)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Process-wide metric registry.
///
/// Writers resolve a [`MetricHandle`] once per series and then update atomics (or a short
/// histogram lock for trends). Readers walk series through [`Registry::query`] without
/// stopping writers.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name` (idempotent). A second registration keeps the original kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name_id = self.interner.intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        id
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.lookup(name)?;
        let defs = self.defs.read();
        defs.iter()
            .position(|d| d.name == name_id)
            .map(|idx| (MetricId(idx as u32), defs[idx].kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.intern(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    /// Returns the write handle for `(metric, tags)`, creating the series on first use.
    pub fn handle(&self, metric: MetricId, tags: &TagSet) -> Option<MetricHandle> {
        let series = self.storage.get(&metric)?;
        if let Some(storage) = series.get(tags) {
            return Some(storage.handle());
        }

        let kind = self.kind(metric)?;
        let storage = series
            .entry(tags.clone())
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    /// Registers `name` and returns the write handle of its `tags` series.
    pub fn series(&self, name: &str, kind: MetricKind, tags: &TagSet) -> MetricHandle {
        let id = self.register(name, kind);
        let kind = self.kind(id).unwrap_or(kind);
        self.storage
            .entry(id)
            .or_default()
            .entry(tags.clone())
            .or_insert_with(|| MetricStorage::new(kind))
            .handle()
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &MetricStorage)) {
        let Some(series) = self.storage.get(&metric) else {
            return;
        };
        for entry in series.iter() {
            f(entry.key(), entry.value());
        }
    }

    fn render_tags(&self, tags: &TagSet) -> Vec<(String, String)> {
        tags.iter()
            .map(|(k, v)| {
                let k = self.interner.resolve(k).map(|s| s.to_string());
                let v = self.interner.resolve(v).map(|s| s.to_string());
                (k.unwrap_or_default(), v.unwrap_or_default())
            })
            .collect()
    }

    /// Every registered series, sorted by metric name then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<MetricDef> = self.defs.read().clone();
        let mut out = Vec::new();

        for (idx, def) in defs.iter().enumerate() {
            let name = self
                .interner
                .resolve(def.name)
                .map(|s| s.to_string())
                .unwrap_or_default();

            self.visit_series(MetricId(idx as u32), |tags, storage| {
                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind: def.kind,
                    tags: self.render_tags(tags),
                    value: storage.value(),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }

    /// One untagged summary per registered metric, merging all of its series.
    pub fn summarize_merged(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<MetricDef> = self.defs.read().clone();
        let mut out: Vec<MetricSeriesSummary> = defs
            .iter()
            .enumerate()
            .filter_map(|(idx, def)| {
                let name = self.interner.resolve(def.name)?.to_string();
                let value = self.query(MetricId(idx as u32)).merged_value()?;
                Some(MetricSeriesSummary {
                    name,
                    kind: def.kind,
                    tags: Vec::new(),
                    value,
                })
            })
            .collect();

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn register_is_idempotent_and_lookup_finds_kind() {
        let reg = Registry::default();
        let a = reg.register("http_reqs", MetricKind::Counter);
        let b = reg.register("http_reqs", MetricKind::Trend);
        assert_eq!(a, b);
        assert_eq!(reg.lookup("http_reqs"), Some((a, MetricKind::Counter)));
        assert_eq!(reg.lookup("nope"), None);
    }

    #[test]
    fn series_registers_once_and_keeps_first_kind() {
        let reg = Registry::default();
        let tags = reg.resolve_tags(&[("scenario", "default")]);

        let a = reg.series("iterations", MetricKind::Counter, &tags);
        let b = reg.series("iterations", MetricKind::Trend, &tags);
        a.add(2);
        b.add(1);

        assert_eq!(a.counter_value(), 3);
        assert_eq!(
            reg.lookup("iterations").map(|(_, kind)| kind),
            Some(MetricKind::Counter)
        );
    }

    #[test]
    fn handles_share_series_storage() {
        let reg = Registry::default();
        let id = reg.register("data_sent", MetricKind::Counter);
        let tags = reg.resolve_tags(&[("scenario", "default")]);

        let h1 = reg.handle(id, &tags).unwrap_or_else(|| panic!("missing handle"));
        let h2 = reg.handle(id, &tags).unwrap_or_else(|| panic!("missing handle"));
        h1.add(3);
        h2.add(4);
        assert_eq!(h1.counter_value(), 7);
    }

    #[test]
    fn summarize_merged_folds_tagged_series() {
        let reg = Registry::default();
        let id = reg.register("req_fail_rate", MetricKind::Rate);
        let get = reg.resolve_tags(&[("method", "GET")]);
        let post = reg.resolve_tags(&[("method", "POST")]);

        if let Some(h) = reg.handle(id, &get) {
            h.add_rate(true);
            h.add_rate(false);
        }
        if let Some(h) = reg.handle(id, &post) {
            h.add_rate(false);
            h.add_rate(false);
        }

        let merged = reg.summarize_merged();
        assert_eq!(merged.len(), 1);
        match &merged[0].value {
            MetricValue::Rate(r) => {
                assert_eq!(r.total, 4);
                assert_eq!(r.hits, 1);
            }
            other => panic!("unexpected value: {other:?}"),
        }

        assert_eq!(reg.summarize().len(), 2);
    }
}
