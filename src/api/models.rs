use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::events::{EventRequest, EventType, UnknownEventType};
use crate::info::{ContainerInfo, ContainerInfoRequest};
use crate::manager::RequestedContainers;

/// A query parameter that cannot be turned into a request.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("timestamp `{0}` is out of range")]
    Timestamp(u64),
    #[error(transparent)]
    EventType(#[from] UnknownEventType),
}

fn from_unix(secs: Option<u64>) -> Result<Option<SystemTime>, ParamError> {
    secs.map(|secs| {
        UNIX_EPOCH
            .checked_add(Duration::from_secs(secs))
            .ok_or(ParamError::Timestamp(secs))
    })
    .transpose()
}

/// Query parameters of the container endpoints. Times are UNIX seconds.
#[derive(Debug, Default, serde::Deserialize)]
pub struct InfoParams {
    pub num_stats: Option<usize>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl TryFrom<InfoParams> for ContainerInfoRequest {
    type Error = ParamError;

    fn try_from(params: InfoParams) -> Result<Self, Self::Error> {
        let mut request = ContainerInfoRequest {
            start: from_unix(params.start)?,
            end: from_unix(params.end)?,
            ..Default::default()
        };
        if let Some(num_stats) = params.num_stats {
            request.num_stats = Some(num_stats);
        }
        Ok(request)
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct EventParams {
    /// Comma separated event types; all types when absent.
    pub types: Option<String>,
    pub container: Option<String>,
    #[serde(default)]
    pub subcontainers: bool,
    pub max_events: Option<usize>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl TryFrom<EventParams> for EventRequest {
    type Error = ParamError;

    fn try_from(params: EventParams) -> Result<Self, Self::Error> {
        let event_types = match params.types.as_deref() {
            None | Some("") => EventType::ALL.into_iter().collect(),
            Some(types) => types
                .split(',')
                .map(|t| t.trim().parse::<EventType>())
                .collect::<Result<HashSet<_>, _>>()?,
        };
        Ok(EventRequest {
            event_types,
            start: from_unix(params.start)?,
            end: from_unix(params.end)?,
            container_name: params.container,
            include_subcontainers: params.subcontainers,
            max_events: params.max_events,
        })
    }
}

/// Result of a subtree query. `failures` maps container names to the reason they are missing.
#[derive(Debug, serde::Serialize)]
pub struct SubcontainersResponse {
    pub containers: Vec<ContainerInfo>,
    pub failures: BTreeMap<String, String>,
}

impl From<RequestedContainers> for SubcontainersResponse {
    fn from(value: RequestedContainers) -> Self {
        let mut containers: Vec<ContainerInfo> = value.containers.into_values().collect();
        containers.sort_by(|a, b| a.name().cmp(b.name()));
        Self {
            containers,
            failures: value
                .failures
                .into_iter()
                .map(|(name, err)| (name, err.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub error: String,
}
