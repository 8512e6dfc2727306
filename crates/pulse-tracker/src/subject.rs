//! Per-user and per-device fields copied onto every built event.

use pulse_types::schemas::keys;
use pulse_types::Payload;

/// Who and what is generating events. Only fields that are set reach the
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub user_id: Option<String>,
    pub network_user_id: Option<String>,
    pub domain_user_id: Option<String>,
    /// Screen resolution as `(width, height)` in pixels.
    pub screen_resolution: Option<(u32, u32)>,
    /// Viewport as `(width, height)` in pixels.
    pub viewport: Option<(u32, u32)>,
    pub color_depth: Option<u32>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn network_user_id(mut self, id: impl Into<String>) -> Self {
        self.network_user_id = Some(id.into());
        self
    }

    pub fn domain_user_id(mut self, id: impl Into<String>) -> Self {
        self.domain_user_id = Some(id.into());
        self
    }

    pub fn screen_resolution(mut self, width: u32, height: u32) -> Self {
        self.screen_resolution = Some((width, height));
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Some((width, height));
        self
    }

    pub fn color_depth(mut self, depth: u32) -> Self {
        self.color_depth = Some(depth);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Writes the fields that are set into `payload`.
    pub fn write_to(&self, payload: &mut Payload) {
        let dims = |(w, h): (u32, u32)| format!("{w}x{h}");

        payload.insert_opt(keys::UID, self.user_id.as_deref());
        payload.insert_opt(keys::NETWORK_UID, self.network_user_id.as_deref());
        payload.insert_opt(keys::DOMAIN_UID, self.domain_user_id.as_deref());
        payload.insert_opt(keys::RESOLUTION, self.screen_resolution.map(dims).as_deref());
        payload.insert_opt(keys::VIEWPORT, self.viewport.map(dims).as_deref());
        payload.insert_opt(
            keys::COLOR_DEPTH,
            self.color_depth.map(|d| d.to_string()).as_deref(),
        );
        payload.insert_opt(keys::LANGUAGE, self.language.as_deref());
        payload.insert_opt(keys::TIMEZONE, self.timezone.as_deref());
        payload.insert_opt(keys::IP_ADDRESS, self.ip_address.as_deref());
        payload.insert_opt(keys::USER_AGENT, self.user_agent.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_set_fields_are_written() {
        let subject = Subject::new()
            .user_id("u-1")
            .screen_resolution(1920, 1080)
            .color_depth(24)
            .language("en-GB");

        let mut payload = Payload::new();
        subject.write_to(&mut payload);

        assert_eq!(payload.get(keys::UID), Some("u-1"));
        assert_eq!(payload.get(keys::RESOLUTION), Some("1920x1080"));
        assert_eq!(payload.get(keys::COLOR_DEPTH), Some("24"));
        assert_eq!(payload.get(keys::LANGUAGE), Some("en-GB"));
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn empty_subject_writes_nothing() {
        let mut payload = Payload::new();
        Subject::new().user_id("").write_to(&mut payload);
        assert!(payload.is_empty());
    }
}
