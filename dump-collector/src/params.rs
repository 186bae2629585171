// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validation of dump creation parameters.

use crate::error::CreateError;
use crate::types::DumpType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DUMP_TYPE_KEY: &str = "DumpType";
pub const ERROR_LOG_ID_KEY: &str = "ErrorLogId";
pub const FAILING_UNIT_ID_KEY: &str = "FailingUnitId";

/// A single creation parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateParamValue {
    String(String),
    U64(u64),
}

impl CreateParamValue {
    fn display(&self) -> String {
        match self {
            CreateParamValue::String(s) => s.clone(),
            CreateParamValue::U64(n) => n.to_string(),
        }
    }
}

impl From<&str> for CreateParamValue {
    fn from(s: &str) -> Self {
        CreateParamValue::String(s.to_string())
    }
}

impl From<String> for CreateParamValue {
    fn from(s: String) -> Self {
        CreateParamValue::String(s)
    }
}

impl From<u64> for CreateParamValue {
    fn from(n: u64) -> Self {
        CreateParamValue::U64(n)
    }
}

pub type DumpCreateParams = BTreeMap<String, CreateParamValue>;

/// Creation parameters after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCreateParams {
    pub dump_type: DumpType,
    /// The error log id as written to the dump directory.
    pub error_log_id: String,
    pub failing_unit: Option<u32>,
    /// The supplied error log id, if it was out of range and replaced by 0.
    pub rejected_error_log_id: Option<String>,
    /// Keys that are not recognized.
    pub ignored_keys: Vec<String>,
}

/// Validate `params`. Nothing is created or touched here, so a rejected
/// request leaves no trace.
pub fn parse_create_params(
    params: &DumpCreateParams,
    max_failing_unit: u32,
) -> Result<ParsedCreateParams, CreateError> {
    let dump_type = match params.get(DUMP_TYPE_KEY) {
        None => return Err(CreateError::missing(DUMP_TYPE_KEY)),
        Some(CreateParamValue::String(s)) => {
            s.parse::<DumpType>().map_err(|_| {
                CreateError::InvalidArgument {
                    argument: DUMP_TYPE_KEY,
                    value: s.clone(),
                }
            })?
        }
        Some(other) => {
            return Err(CreateError::InvalidArgument {
                argument: DUMP_TYPE_KEY,
                value: other.display(),
            })
        }
    };

    // Numeric ids are rendered as 8 hex digits; anything that does not fit
    // a platform log id becomes 0. String ids are passed through untouched.
    let (error_log_id, rejected_error_log_id) =
        match params.get(ERROR_LOG_ID_KEY) {
            None => return Err(CreateError::missing(ERROR_LOG_ID_KEY)),
            Some(CreateParamValue::String(s)) => (s.clone(), None),
            Some(CreateParamValue::U64(n)) => match u32::try_from(*n) {
                Ok(id) => (format!("{id:08x}"), None),
                Err(_) => (format!("{:08x}", 0), Some(n.to_string())),
            },
        };

    let failing_unit = if dump_type.requires_failing_unit() {
        match params.get(FAILING_UNIT_ID_KEY) {
            None => return Err(CreateError::missing(FAILING_UNIT_ID_KEY)),
            Some(CreateParamValue::U64(n)) => {
                match u32::try_from(*n) {
                    Ok(unit) if unit <= max_failing_unit => Some(unit),
                    _ => {
                        return Err(CreateError::InvalidArgument {
                            argument: FAILING_UNIT_ID_KEY,
                            value: n.to_string(),
                        })
                    }
                }
            }
            Some(other) => {
                return Err(CreateError::InvalidArgument {
                    argument: FAILING_UNIT_ID_KEY,
                    value: other.display(),
                })
            }
        }
    } else {
        None
    };

    let ignored_keys = params
        .keys()
        .filter(|key| {
            ![DUMP_TYPE_KEY, ERROR_LOG_ID_KEY, FAILING_UNIT_ID_KEY]
                .contains(&key.as_str())
        })
        .cloned()
        .collect();

    Ok(ParsedCreateParams {
        dump_type,
        error_log_id,
        failing_unit,
        rejected_error_log_id,
        ignored_keys,
    })
}
