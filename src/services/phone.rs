//! Phone number clean-up and channel addressing.
//!
//! Customer phones are stored as typed by operators ("+91 98765-43210",
//! "098765 43210", ...). Everything here reduces them to the 10-digit
//! national form before composing a provider address.

/// National calling code, as written in E.164 addresses.
pub const COUNTRY_CODE: &str = "+91";
const COUNTRY_DIGITS: &str = "91";
pub const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Reduce a raw phone string to its 10-digit local form.
/// Returns `None` when the digits cannot form a valid local number.
pub fn normalize(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 12 && digits.starts_with(COUNTRY_DIGITS) {
        digits.drain(..2);
    }
    if digits.len() == 11 && digits.starts_with('0') {
        digits.remove(0);
    }

    (digits.len() == 10).then_some(digits)
}

/// SMS destination: `+91` followed by the local number.
pub fn sms_address(raw: &str) -> Option<String> {
    normalize(raw).map(|local| format!("{COUNTRY_CODE}{local}"))
}

/// WhatsApp destination: `whatsapp:+91` followed by the local number.
pub fn whatsapp_address(raw: &str) -> Option<String> {
    sms_address(raw).map(|e164| format!("{WHATSAPP_PREFIX}{e164}"))
}

/// Canonical form of a configured SMS sender. Only senders that are local
/// (`+91` or no international prefix) are normalised; any other E.164 number
/// or short code is kept as configured, minus whitespace.
pub fn canonical_sms_sender(configured: &str) -> String {
    let compact: String = configured.chars().filter(|c| !c.is_whitespace()).collect();
    if is_foreign(&compact) {
        return compact;
    }
    sms_address(&compact).unwrap_or(compact)
}

/// Canonical form of a configured WhatsApp sender, with or without the
/// `whatsapp:` prefix.
pub fn canonical_whatsapp_sender(configured: &str) -> String {
    let trimmed = configured.trim();
    let bare = trimmed.strip_prefix(WHATSAPP_PREFIX).unwrap_or(trimmed);
    format!("{WHATSAPP_PREFIX}{}", canonical_sms_sender(bare))
}

fn is_foreign(e164: &str) -> bool {
    e164.starts_with('+') && !e164.starts_with(COUNTRY_CODE)
}
