//! Schema URIs and wire keys used by built events.

/// Wrapper schema for the array of context entities on a built event.
pub const CONTEXTS: &str = "iglu:dev.pulse/contexts/jsonschema/1-0-1";
/// Wrapper schema for a self-describing event body.
pub const UNSTRUCT_EVENT: &str = "iglu:dev.pulse/unstruct_event/jsonschema/1-0-0";
/// Wrapper schema for a POST request body carrying several payloads.
pub const PAYLOAD_DATA: &str = "iglu:dev.pulse/payload_data/jsonschema/1-0-4";

/// Application moved to the foreground.
pub const APPLICATION_FOREGROUND: &str =
    "iglu:dev.pulse/application_foreground/jsonschema/1-0-0";
/// Application moved to the background.
pub const APPLICATION_BACKGROUND: &str =
    "iglu:dev.pulse/application_background/jsonschema/1-0-0";
/// Application installed (tracked once per namespace).
pub const APPLICATION_INSTALL: &str = "iglu:dev.pulse/application_install/jsonschema/1-0-0";
/// A screen was shown.
pub const SCREEN_VIEW: &str = "iglu:dev.pulse/screen_view/jsonschema/1-0-0";
/// The application was opened through a deep link.
pub const DEEP_LINK_RECEIVED: &str = "iglu:dev.pulse/deep_link_received/jsonschema/1-0-0";

/// Deep link entity attached to the screen view following a deep link.
pub const DEEP_LINK_ENTITY: &str = "iglu:dev.pulse/deep_link/jsonschema/1-0-0";
/// Session entity.
pub const CLIENT_SESSION: &str = "iglu:dev.pulse/client_session/jsonschema/1-0-2";
/// Application lifecycle entity.
pub const APPLICATION_LIFECYCLE: &str =
    "iglu:dev.pulse/application_lifecycle/jsonschema/1-0-0";
/// GDPR basis-for-processing entity.
pub const GDPR: &str = "iglu:dev.pulse/gdpr/jsonschema/1-0-0";
/// Device and platform entity.
pub const MOBILE_CONTEXT: &str = "iglu:dev.pulse/mobile_context/jsonschema/1-0-2";

/// Flat keys of a built event.
pub mod keys {
    /// Event name (`se`, `pv`, `ue`).
    pub const EVENT: &str = "e";
    /// Event UUID.
    pub const EVENT_ID: &str = "eid";
    /// Device-created timestamp (ms).
    pub const DEVICE_TIMESTAMP: &str = "dtm";
    /// Client-assigned true timestamp (ms).
    pub const TRUE_TIMESTAMP: &str = "ttm";
    /// Sent timestamp (ms), stamped by the emitter.
    pub const SENT_TIMESTAMP: &str = "stm";
    /// Tracker version.
    pub const TRACKER_VERSION: &str = "tv";
    /// Tracker namespace.
    pub const NAMESPACE: &str = "tna";
    /// Application id.
    pub const APP_ID: &str = "aid";
    /// Platform.
    pub const PLATFORM: &str = "p";

    /// Context array, plain JSON.
    pub const CONTEXT: &str = "co";
    /// Context array, base64 encoded.
    pub const CONTEXT_ENCODED: &str = "cx";
    /// Self-describing event body, plain JSON.
    pub const UNSTRUCTURED: &str = "ue_pr";
    /// Self-describing event body, base64 encoded.
    pub const UNSTRUCTURED_ENCODED: &str = "ue_px";

    /// Structured event fields.
    pub const SE_CATEGORY: &str = "se_ca";
    /// Structured event action.
    pub const SE_ACTION: &str = "se_ac";
    /// Structured event label.
    pub const SE_LABEL: &str = "se_la";
    /// Structured event property.
    pub const SE_PROPERTY: &str = "se_pr";
    /// Structured event value.
    pub const SE_VALUE: &str = "se_va";

    /// Page URL.
    pub const PAGE_URL: &str = "url";
    /// Page title.
    pub const PAGE_TITLE: &str = "page";
    /// Page referrer.
    pub const PAGE_REFERRER: &str = "refr";

    /// Subject user id.
    pub const UID: &str = "uid";
    /// Subject screen resolution.
    pub const RESOLUTION: &str = "res";
    /// Subject viewport.
    pub const VIEWPORT: &str = "vp";
    /// Subject color depth.
    pub const COLOR_DEPTH: &str = "cd";
    /// Subject language.
    pub const LANGUAGE: &str = "lang";
    /// Subject timezone.
    pub const TIMEZONE: &str = "tz";
    /// Subject IP address.
    pub const IP_ADDRESS: &str = "ip";
    /// Subject user agent.
    pub const USER_AGENT: &str = "ua";
    /// Subject domain user id.
    pub const DOMAIN_UID: &str = "duid";
    /// Subject network user id.
    pub const NETWORK_UID: &str = "tnuid";
}

/// Event names for the `e` key.
pub mod names {
    /// Structured event.
    pub const STRUCTURED: &str = "se";
    /// Page view.
    pub const PAGE_VIEW: &str = "pv";
    /// Self-describing event.
    pub const SELF_DESCRIBING: &str = "ue";
}
