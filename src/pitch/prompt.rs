//! Prompt construction and output parsing for cold-email pitches.

use crate::llm::ChatMessage;
use crate::store::LeadRecord;

/// Everything the model needs to know about one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchRequest {
    pub company: String,
    pub role: String,
    pub context: String,
    /// Why the sender likes this company. May be empty.
    pub affinity_note: String,
}

impl PitchRequest {
    pub fn for_lead(lead: &LeadRecord) -> Self {
        Self {
            company: lead.company.clone(),
            role: lead.role.clone(),
            context: lead.context.clone(),
            affinity_note: lead.affinity_note.clone(),
        }
    }

    /// Subject used when the model does not produce one.
    pub fn fallback_subject(&self) -> String {
        format!("{} at {}", self.role.trim(), self.company.trim())
    }
}

/// A generated pitch, split into subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchText {
    pub subject: String,
    pub body: String,
}

pub(crate) fn build_messages(
    request: &PitchRequest,
    value_add: &str,
    sender_name: &str,
) -> Vec<ChatMessage> {
    let system_prompt = format!(
        "You are a professional career coach writing cold emails on behalf of {sender_name}.\n\
         Rules you MUST follow:\n\
         1. Output ONLY plain text. No markdown, no bold, no bullet points, no asterisks.\n\
         2. The first line must be the subject line in the format: Subject: <subject text>\n\
         3. Then leave one blank line and write the email body.\n\
         4. NEVER use placeholders like [Your Name], [Company Name] or [Role]. \
         Use the actual values provided.\n\
         5. Keep the tone professional yet warm, like a real human wrote it.\n\
         6. The email must be concise (under 200 words for the body).\n\
         7. Do NOT include a signature block. It will be appended separately.\n\
         8. End the body with a brief, confident call to action."
    );

    let mut task = format!(
        "Write a cold email to {company} for the role of {role}.\n\
         Job description snippet: {context}\n\
         My unique value add: {value_add}",
        company = request.company,
        role = request.role,
        context = request.context,
    );
    if !request.affinity_note.trim().is_empty() {
        task.push_str(&format!(
            "\nPersonal connection / why I love them: {} \
             (Weave this naturally into the opening line to show genuine interest.)",
            request.affinity_note.trim()
        ));
    }
    task.push_str(&format!(
        "\nThe sender's name is {sender_name}. Use it in the sign-off."
    ));

    vec![ChatMessage::system(system_prompt), ChatMessage::user(task)]
}

/// Split raw model output into subject and body.
///
/// A first line starting with `Subject:` (any case) is the subject; the rest
/// is the body. Markdown emphasis and heading marks are stripped from the body.
pub(crate) fn parse_pitch(raw: &str, fallback_subject: &str) -> PitchText {
    let raw = raw.trim();
    let (first, rest) = match raw.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (raw, ""),
    };

    let (subject, body) = if first.to_ascii_lowercase().starts_with("subject:") {
        let subject = first
            .split_once(':')
            .map(|(_, s)| s.trim())
            .unwrap_or_default();
        (subject.to_string(), rest.trim())
    } else {
        (String::new(), raw)
    };

    let body = body.replace("**", "").replace(['*', '#'], "");
    let subject = if subject.is_empty() {
        fallback_subject.to_string()
    } else {
        subject
    };

    PitchText {
        subject,
        body: body.trim().to_string(),
    }
}
