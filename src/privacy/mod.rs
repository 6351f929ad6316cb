//! Privacy-tiered help request model.
//!
//! - `masking`: pure functions deriving the public tier from contact fields
//! - `models`: help requests, volunteer responses and their status enums
//! - `resolver`: per-viewer tier selection and listing order
//!
//! Nothing here touches configuration, storage or I/O.

pub mod masking;
pub mod models;
pub mod resolver;

pub use masking::{mask_address, mask_data, mask_email, mask_name, mask_phone};
pub use models::{
    ContactInfo, HelpRequest, NewHelpRequest, RequestStatus, ResponseStatus, Urgency,
    VolunteerResponse,
};
pub use resolver::{
    is_authorized, resolve, resolve_commitment, resolve_listing, resolve_request,
    sort_for_listing, Disclosure, ResolvedCommitment, ResolvedRequest, ViewerResponseSet,
};
