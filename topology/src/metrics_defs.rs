//! Metrics definitions for the topology sync.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

pub const OBJECTS_FETCHED: MetricDef = MetricDef {
    name: "object_store.fetched",
    metric_type: MetricType::Counter,
    description: "Number of JSON documents read from the object store",
};

pub const OBJECT_FETCH_FAILED: MetricDef = MetricDef {
    name: "object_store.fetch_failed",
    metric_type: MetricType::Counter,
    description: "Number of object store reads that failed or did not parse",
};

pub const RESOURCES_SENT: MetricDef = MetricDef {
    name: "topology.resources.sent",
    metric_type: MetricType::Counter,
    description: "Number of topology nodes accepted by the resources endpoint",
};

pub const RESOURCES_FAILED: MetricDef = MetricDef {
    name: "topology.resources.failed",
    metric_type: MetricType::Counter,
    description: "Number of topology nodes rejected or not delivered",
};

pub const REFERENCES_SENT: MetricDef = MetricDef {
    name: "topology.references.sent",
    metric_type: MetricType::Counter,
    description: "Number of topology edges accepted by the references endpoint",
};

pub const REFERENCES_FAILED: MetricDef = MetricDef {
    name: "topology.references.failed",
    metric_type: MetricType::Counter,
    description: "Number of topology edges rejected or not delivered",
};

pub const SYNC_DURATION: MetricDef = MetricDef {
    name: "sync.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a full assemble and publish run in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    OBJECTS_FETCHED,
    OBJECT_FETCH_FAILED,
    RESOURCES_SENT,
    RESOURCES_FAILED,
    REFERENCES_SENT,
    REFERENCES_FAILED,
    SYNC_DURATION,
];
