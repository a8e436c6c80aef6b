use prometheus::{IntCounterVec, Opts, Registry};

const CLUSTER_TYPE_LABEL: &str = "cluster_type";
const REPOSITORY_LABEL: &str = "repository";
const TAGGED_LABEL: &str = "tagged";
const OUTCOME_LABEL: &str = "outcome";

/// Counters exported by the collector.
///
/// Each counter is registered with the registry handed to [`ReaperMetrics::new`],
/// so a test can build a private registry and read the values back.
#[derive(Clone)]
pub struct ReaperMetrics {
    pub images_deleted: IntCounterVec,
    pub images_retained: IntCounterVec,
    pub delete_errors: IntCounterVec,
    pub list_errors: IntCounterVec,
    pub passes: IntCounterVec,
}

impl ReaperMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let images_deleted = IntCounterVec::new(
            Opts::new("imgreaper_images_deleted_total", "The total number of image manifests deleted"),
            &[CLUSTER_TYPE_LABEL, REPOSITORY_LABEL, TAGGED_LABEL],
        )?;
        let images_retained = IntCounterVec::new(
            Opts::new("imgreaper_images_retained_total", "The total number of image manifests retained"),
            &[CLUSTER_TYPE_LABEL, REPOSITORY_LABEL, TAGGED_LABEL],
        )?;
        let delete_errors = IntCounterVec::new(
            Opts::new("imgreaper_delete_errors_total", "Failed manifest deletions"),
            &[REPOSITORY_LABEL],
        )?;
        let list_errors = IntCounterVec::new(
            Opts::new("imgreaper_list_errors_total", "Failed manifest listings"),
            &[REPOSITORY_LABEL],
        )?;
        let passes = IntCounterVec::new(
            Opts::new("imgreaper_passes_total", "Collection passes by outcome"),
            &[OUTCOME_LABEL],
        )?;

        registry.register(Box::new(images_deleted.clone()))?;
        registry.register(Box::new(images_retained.clone()))?;
        registry.register(Box::new(delete_errors.clone()))?;
        registry.register(Box::new(list_errors.clone()))?;
        registry.register(Box::new(passes.clone()))?;

        Ok(Self {
            images_deleted,
            images_retained,
            delete_errors,
            list_errors,
            passes,
        })
    }

    pub fn add_deleted(&self, cluster_type: &str, repository: &str, tagged: bool) {
        self.images_deleted
            .with_label_values(&[cluster_type, repository, tagged_label(tagged)])
            .inc();
    }

    pub fn add_retained(&self, cluster_type: &str, repository: &str, tagged: bool) {
        self.images_retained
            .with_label_values(&[cluster_type, repository, tagged_label(tagged)])
            .inc();
    }

    pub fn add_delete_error(&self, repository: &str) {
        self.delete_errors.with_label_values(&[repository]).inc();
    }

    pub fn add_list_error(&self, repository: &str) {
        self.list_errors.with_label_values(&[repository]).inc();
    }

    pub fn add_pass(&self, outcome: &str) {
        self.passes.with_label_values(&[outcome]).inc();
    }
}

fn tagged_label(tagged: bool) -> &'static str {
    if tagged { "true" } else { "false" }
}
