//! Final message assembly: generated body plus a fixed signature block.

use super::prompt::PitchText;

/// Who the outreach is from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderIdentity {
    pub name: String,
    pub phone: String,
    pub linkedin: String,
    pub portfolio: String,
}

/// The plain-text body that goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plain-text signature. Empty contact fields are left out.
pub fn signature(sender: &SenderIdentity) -> String {
    let mut lines = vec![String::new(), "---".to_string(), sender.name.trim().to_string()];
    for (label, value) in [
        ("Phone", &sender.phone),
        ("LinkedIn", &sender.linkedin),
        ("Portfolio", &sender.portfolio),
    ] {
        let value = value.trim();
        if !value.is_empty() {
            lines.push(format!("{label}: {value}"));
        }
    }
    lines.join("\n")
}

/// Append the signature block to the generated body.
pub fn compose(pitch: &PitchText, sender: &SenderIdentity) -> MessageBody {
    MessageBody(format!("{}\n{}", pitch.body.trim_end(), signature(sender)))
}
