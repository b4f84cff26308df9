//! Domain types shared by the token endpoint.
//!
//! - [`OAuthClient`] - registered OAuth 2.0 client
//! - [`CodeGrant`] / [`SettingsActionGrant`] - single-use codes
//! - [`Authorization`] - accumulated client/user consent
//! - [`OfflineGrant`] - refresh-token session
//! - [`AccessGrant`] / [`AppSessionToken`] - issued artifacts

pub mod authorization;
pub mod client;
pub mod grant;
pub mod offline_grant;
pub mod session;

pub use authorization::Authorization;
pub use client::{ClientCredentials, OAuthClient};
pub use grant::{
    AuthenticationInfo, AuthorizationRequest, CODE_GRANT_LIFETIME, CodeGrant,
    SettingsActionGrant, UiParam,
};
pub use offline_grant::{
    AccessEvent, AccessInfo, DeviceInfo, DeviceKeyBinding, DeviceKeyTransition, OfflineGrant,
    OfflineGrantSession, RefreshTokenEntry,
};
pub use session::{
    AccessGrant, AppSessionToken, CallerSession, GrantSessionKind, IdpSession, SessionType,
    decode_sid, encode_sid,
};
