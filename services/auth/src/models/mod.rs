//! Authentication service models

pub mod organization;
pub mod partner;
pub mod token;

pub use organization::{OAuthSettings, OAuthSettingsUpdate, Organization};
pub use partner::{NewPartnerMember, PartnerMember, PartnerSession};
pub use token::RefreshRecord;
