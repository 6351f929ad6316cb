use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::privacy::models::{
    ContactInfo, HelpRequest, RequestStatus, Urgency, VolunteerResponse,
};

/// Request IDs the current viewer holds a volunteer response for.
/// Built once per listing call.
pub type ViewerResponseSet = HashSet<String>;

/// Which tier a viewer gets for one request.
#[derive(Debug, Clone, Copy)]
pub struct Disclosure<'a> {
    pub display_data: &'a ContactInfo,
    pub is_authorized: bool,
}

/// Owner, or any volunteer response on the request regardless of its status.
/// Anonymous viewers are never authorized.
pub fn is_authorized(
    viewer_id: Option<&str>,
    request: &HelpRequest,
    viewer_responses: Option<&ViewerResponseSet>,
) -> bool {
    let Some(viewer_id) = viewer_id else {
        return false;
    };

    if request.owner_id == viewer_id {
        return true;
    }

    viewer_responses
        .map(|set| set.contains(&request.id))
        .unwrap_or(false)
}

pub fn resolve<'a>(
    viewer_id: Option<&str>,
    request: &'a HelpRequest,
    viewer_responses: Option<&ViewerResponseSet>,
) -> Disclosure<'a> {
    let is_authorized = is_authorized(viewer_id, request, viewer_responses);
    let display_data = if is_authorized {
        request.private_data()
    } else {
        request.public_data()
    };

    Disclosure {
        display_data,
        is_authorized,
    }
}

/// Urgency descending, then newest first.
pub fn listing_order(a: &HelpRequest, b: &HelpRequest) -> Ordering {
    b.urgency
        .severity()
        .cmp(&a.urgency.severity())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn sort_for_listing(requests: &mut [HelpRequest]) {
    requests.sort_by(listing_order);
}

/// Wire form of a help request after disclosure. Neither tier is carried
/// directly; only the one selected for this viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRequest {
    pub id: String,
    pub owner_id: String,
    pub help_type: String,
    pub urgency: Urgency,
    pub description: String,
    pub status: RequestStatus,
    pub volunteer_count: u32,
    pub created_at: i64,
    pub display_data: ContactInfo,
    pub is_authorized: bool,
}

impl ResolvedRequest {
    fn project(request: &HelpRequest, disclosure: Disclosure<'_>) -> Self {
        Self {
            id: request.id.clone(),
            owner_id: request.owner_id.clone(),
            help_type: request.help_type.clone(),
            urgency: request.urgency,
            description: request.description.clone(),
            status: request.status,
            volunteer_count: request.volunteer_count,
            created_at: request.created_at,
            display_data: disclosure.display_data.clone(),
            is_authorized: disclosure.is_authorized,
        }
    }
}

pub fn resolve_request(
    viewer_id: Option<&str>,
    request: &HelpRequest,
    viewer_responses: Option<&ViewerResponseSet>,
) -> ResolvedRequest {
    let disclosure = resolve(viewer_id, request, viewer_responses);
    ResolvedRequest::project(request, disclosure)
}

/// Order a listing and resolve every record against the same response set.
pub fn resolve_listing(
    viewer_id: Option<&str>,
    mut requests: Vec<HelpRequest>,
    viewer_responses: Option<&ViewerResponseSet>,
) -> Vec<ResolvedRequest> {
    sort_for_listing(&mut requests);
    requests
        .iter()
        .map(|request| resolve_request(viewer_id, request, viewer_responses))
        .collect()
}

/// One entry of a volunteer's commitments view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCommitment {
    #[serde(flatten)]
    pub response: VolunteerResponse,
    pub request: ResolvedRequest,
}

/// The response row itself places the request in the volunteer's set, so the
/// private tier is always disclosed here.
pub fn resolve_commitment(response: VolunteerResponse, request: &HelpRequest) -> ResolvedCommitment {
    let responses: ViewerResponseSet = HashSet::from([response.request_id.clone()]);
    let request = resolve_request(Some(&response.volunteer_id), request, Some(&responses));
    ResolvedCommitment { response, request }
}
