/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_markdown: bool,
    pub supports_photos: bool,
    pub supports_membership_check: bool,
    pub max_message_len: usize,
    pub max_caption_len: usize,
}

/// The agent's standing in a destination chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Member, administrator or owner.
    Present,
    /// Member but not allowed to post.
    Restricted,
    /// Left, kicked or never joined.
    Absent,
}

impl Membership {
    pub fn can_post(self) -> bool {
        matches!(self, Membership::Present)
    }
}
