//! Deduplication key derivation.

use crate::event::{LogEvent, PropertyValue};
use crate::settings::DeduplicationSettings;

/// Separator placed between key fragments.
pub const KEY_SEPARATOR: &str = "-";

/// Builds the deduplication key for an event.
///
/// Fragments are the configured key properties in order (missing ones are
/// skipped), followed by the raw message template when enabled and
/// non-empty. An empty result means no key could be formed.
pub fn derive_key(event: &LogEvent, settings: &DeduplicationSettings) -> String {
    let mut fragments: Vec<String> = settings
        .key_properties
        .iter()
        .filter_map(|name| event.property(name))
        .map(render_fragment)
        .collect();

    if settings.include_message_template && !event.message_template.is_empty() {
        fragments.push(event.message_template.clone());
    }

    fragments.join(KEY_SEPARATOR)
}

fn render_fragment(value: &PropertyValue) -> String {
    match value.as_scalar() {
        Some(scalar) => scalar.to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;

    fn settings(properties: &[&str], include_template: bool) -> DeduplicationSettings {
        DeduplicationSettings {
            key_properties: properties.iter().map(|p| p.to_string()).collect(),
            include_message_template: include_template,
            ..Default::default()
        }
    }

    #[test]
    fn test_key_composition_order() {
        let event = LogEvent::new(Severity::Error, "Test message")
            .with_property("DeviceName", "Device1")
            .with_property("Source", "App")
            .with_property("Code", "123");
        let key = derive_key(&event, &settings(&["Code", "Source", "DeviceName"], true));
        assert_eq!(key, "123-App-Device1-Test message");
    }

    #[test]
    fn test_missing_properties_skipped() {
        let event = LogEvent::new(Severity::Error, "Disk full").with_property("Code", "E1");
        let key = derive_key(&event, &settings(&["Code", "Source"], true));
        assert_eq!(key, "E1-Disk full");
    }

    #[test]
    fn test_template_only() {
        let event = LogEvent::new(Severity::Information, "Started {Service}");
        assert_eq!(derive_key(&event, &settings(&[], true)), "Started {Service}");
    }

    #[test]
    fn test_empty_key_without_template() {
        let event = LogEvent::new(Severity::Information, "Hello").with_property("Code", "1");
        assert_eq!(derive_key(&event, &settings(&[], false)), "");
        assert_eq!(derive_key(&event, &settings(&["Missing"], false)), "");
    }

    #[test]
    fn test_empty_template_adds_no_fragment() {
        let event = LogEvent::new(Severity::Error, "").with_property("device", "sda");
        assert_eq!(derive_key(&event, &settings(&["device"], true)), "sda");

        let bare = LogEvent::new(Severity::Error, "");
        assert_eq!(derive_key(&bare, &settings(&[], true)), "");
    }

    #[test]
    fn test_properties_without_template() {
        let event = LogEvent::new(Severity::Warning, "Ignored")
            .with_property("Code", 7i64)
            .with_property("Retry", true);
        assert_eq!(derive_key(&event, &settings(&["Code", "Retry"], false)), "7-true");
    }

    #[test]
    fn test_composite_uses_generic_rendering() {
        let event = LogEvent::new(Severity::Debug, "Batch")
            .with_property("Ids", PropertyValue::Sequence(vec!["a".into(), 2u64.into()]));
        assert_eq!(derive_key(&event, &settings(&["Ids"], true)), "[\"a\", 2]-Batch");
    }

    #[test]
    fn test_property_names_are_case_sensitive() {
        let event = LogEvent::new(Severity::Error, "x").with_property("code", "1");
        assert_eq!(derive_key(&event, &settings(&["Code"], false)), "");
    }
}
