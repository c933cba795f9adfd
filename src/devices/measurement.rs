use crate::config::registry::TargetKey;
use crate::utils::error::FailureKind;

/// One metric's decoded values from one device in one cycle.
///
/// `values` is empty when the poll failed; `failure` then says why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub key: TargetKey,
    pub values: Vec<i64>,
    pub failure: Option<FailureKind>,
}

impl Measurement {
    pub fn success(key: TargetKey, values: Vec<i64>) -> Self {
        Self {
            key,
            values,
            failure: None,
        }
    }

    pub fn failed(key: TargetKey, kind: FailureKind) -> Self {
        Self {
            key,
            values: Vec::new(),
            failure: Some(kind),
        }
    }

    pub fn device_address(&self) -> u8 {
        self.key.address
    }

    pub fn metric_name(&self) -> &str {
        &self.key.metric
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
