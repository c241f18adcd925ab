//! Grading request/result wire types.
//!
//! Requests are read leniently. A field of the wrong JSON type never
//! rejects the request: it degrades to something that grades as a failure,
//! so a malformed submission still gets a `{passed, total}` tally.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

/// One submission to grade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    /// Name of the function the tests call. Missing or not a string reads
    /// as empty, which never resolves.
    #[serde(default, deserialize_with = "lenient_name")]
    pub function_name: String,

    /// Template source, used when `code` is blank.
    #[serde(default)]
    pub starter: Option<Json>,

    /// The candidate's source.
    #[serde(default)]
    pub code: Option<Json>,

    /// Cases to run, in order. Absent, or anything but an array, means zero cases.
    #[serde(default, deserialize_with = "lenient_tests")]
    pub tests: Option<Vec<TestCase>>,
}

impl GradingRequest {
    /// Read a request from any JSON value. A non-object reads as an empty
    /// request.
    pub fn from_json(value: Json) -> Self {
        match value {
            Json::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// The source to compile: `code` unless it is missing, `null`, empty or
    /// whitespace, otherwise `starter`. `None` when the chosen field is not
    /// a string, so nothing can compile.
    pub fn source(&self) -> Option<&str> {
        match &self.code {
            Some(Json::String(code)) if !code.trim().is_empty() => Some(code),
            Some(Json::String(_)) | Some(Json::Null) | None => match &self.starter {
                Some(Json::String(starter)) => Some(starter),
                Some(Json::Null) | None => Some(""),
                Some(_) => None,
            },
            Some(_) => None,
        }
    }

    pub fn total(&self) -> usize {
        self.tests.as_ref().map_or(0, Vec::len)
    }
}

/// Arguments for one call and the value it should return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// `None` when the field held something other than an array or `null`;
    /// such a case cannot be called and never matches.
    #[serde(
        default = "no_args",
        deserialize_with = "lenient_args",
        skip_serializing_if = "Option::is_none"
    )]
    pub args: Option<Vec<Json>>,

    /// `None` when the field is absent (the function should return
    /// `undefined`); `Some(Null)` for an explicit `null`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected: Option<Json>,
}

impl TestCase {
    /// A case read from any JSON value. Reading `args` off a scalar finds
    /// nothing, so the call gets no arguments; off `null` it fails.
    fn from_json(value: Json) -> Self {
        match value {
            Json::Object(_) => serde_json::from_value(value).unwrap_or(Self {
                args: None,
                expected: None,
            }),
            Json::Null => Self {
                args: None,
                expected: None,
            },
            _ => Self {
                args: no_args(),
                expected: None,
            },
        }
    }
}

fn no_args() -> Option<Vec<Json>> {
    Some(Vec::new())
}

fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Json::deserialize(deserializer)? {
        Json::String(name) => name,
        _ => String::new(),
    })
}

fn lenient_args<'de, D>(deserializer: D) -> Result<Option<Vec<Json>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Json::deserialize(deserializer)? {
        Json::Array(args) => Some(args),
        Json::Null => no_args(),
        _ => None,
    })
}

fn lenient_tests<'de, D>(deserializer: D) -> Result<Option<Vec<TestCase>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Json::deserialize(deserializer)? {
        Json::Array(cases) => Some(cases.into_iter().map(TestCase::from_json).collect()),
        _ => None,
    })
}

/// Aggregate outcome; `passed <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingResult {
    pub passed: usize,
    pub total: usize,
}

impl GradingResult {
    /// Result for a submission that never compiled.
    pub fn failed(total: usize) -> Self {
        Self { passed: 0, total }
    }
}
