//! Job registry: tag -> factory.

use super::{Job, JobType};
use crate::error::{Error, Result};
use crate::model::JobTag;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fully wired job instance. Collaborators are captured by the closure.
pub type JobFactory = Arc<dyn Fn() -> Result<Box<dyn Job>> + Send + Sync>;

/// Registry of job factories, indexed by tag.
#[derive(Default, Clone)]
pub struct JobRegistry {
    factories: HashMap<JobTag, JobFactory>,
}

impl JobRegistry {
    /// Create an empty registry with no jobs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register the factory for job type `J` under `J::TAG`.
    pub fn register<J, F>(&mut self, factory: F) -> &mut Self
    where
        J: JobType,
        F: Fn() -> Result<Box<dyn Job>> + Send + Sync + 'static,
    {
        self.register_tag(J::TAG, factory)
    }

    /// Register a factory under an explicit tag. Replaces any previous entry.
    pub fn register_tag<F>(&mut self, tag: impl Into<JobTag>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Job>> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    /// Look up the factory for a tag.
    pub fn factory(&self, tag: &JobTag) -> Result<JobFactory> {
        self.factories
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::UnknownJobType(tag.to_string()))
    }

    /// Resolve and construct the job for a tag.
    pub fn build(&self, tag: &JobTag) -> Result<Box<dyn Job>> {
        let factory = self.factory(tag)?;
        factory().map_err(|e| match e {
            e @ (Error::JobConstruction { .. } | Error::UnknownJobType(_)) => e,
            other => Error::JobConstruction {
                tag: tag.to_string(),
                reason: other.to_string(),
            },
        })
    }

    pub fn contains(&self, tag: &JobTag) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<JobTag> {
        let mut tags: Vec<_> = self.factories.keys().cloned().collect();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    impl JobType for Noop {
        const TAG: &'static str = "noop";
    }

    #[test]
    fn build_unknown_tag_is_construction_error() {
        let registry = JobRegistry::empty();
        let err = registry.build(&JobTag::new("missing")).err().unwrap();
        assert!(err.is_construction());
        assert!(matches!(err, Error::UnknownJobType(ref t) if t == "missing"));
    }

    #[test]
    fn factory_errors_are_wrapped_as_construction() {
        let mut registry = JobRegistry::empty();
        registry.register_tag("broken", || Err(Error::Other("no pool".into())));
        let err = registry.build(&JobTag::new("broken")).err().unwrap();
        match err {
            Error::JobConstruction { tag, reason } => {
                assert_eq!(tag, "broken");
                assert_eq!(reason, "no pool");
            }
            other => panic!("expected JobConstruction, got {other:?}"),
        }
    }

    #[test]
    fn tags_are_sorted() {
        let mut registry = JobRegistry::empty();
        registry
            .register_tag("zeta", || Ok(Box::new(Noop) as Box<dyn Job>))
            .register::<Noop, _>(|| Ok(Box::new(Noop) as Box<dyn Job>));
        let tags: Vec<_> = registry.tags().iter().map(|t| t.to_string()).collect();
        assert_eq!(tags, vec!["noop", "zeta"]);
        assert!(registry.contains(&JobTag::new("noop")));
    }
}
