//! The closed catalogue of field types.

use std::fmt;

/// A field's input kind. Names round-trip exactly with the stored
/// `field_type` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    TextInput,
    EmailInput,
    NumberInput,
    PhoneInput,
    TextArea,
    DateInput,
    TimeInput,
    DateTimeInput,
    Checkbox,
    RadioButton,
    DropdownSelect,
    MultiSelect,
    FileUpload,
    ImageUpload,
    VideoUpload,
    DocumentUpload,
    UrlInput,
    PasswordInput,
    ColorPicker,
    Rating,
    Slider,
    ToggleSwitch,
    CurrencyInput,
    PercentageInput,
    SignaturePad,
    LocationPicker,
    AddressInput,
    VoiceRecord,
}

impl FieldType {
    pub const ALL: [FieldType; 28] = [
        FieldType::TextInput,
        FieldType::EmailInput,
        FieldType::NumberInput,
        FieldType::PhoneInput,
        FieldType::TextArea,
        FieldType::DateInput,
        FieldType::TimeInput,
        FieldType::DateTimeInput,
        FieldType::Checkbox,
        FieldType::RadioButton,
        FieldType::DropdownSelect,
        FieldType::MultiSelect,
        FieldType::FileUpload,
        FieldType::ImageUpload,
        FieldType::VideoUpload,
        FieldType::DocumentUpload,
        FieldType::UrlInput,
        FieldType::PasswordInput,
        FieldType::ColorPicker,
        FieldType::Rating,
        FieldType::Slider,
        FieldType::ToggleSwitch,
        FieldType::CurrencyInput,
        FieldType::PercentageInput,
        FieldType::SignaturePad,
        FieldType::LocationPicker,
        FieldType::AddressInput,
        FieldType::VoiceRecord,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::TextInput => "Text Input",
            FieldType::EmailInput => "Email Input",
            FieldType::NumberInput => "Number Input",
            FieldType::PhoneInput => "Phone Input",
            FieldType::TextArea => "Text Area",
            FieldType::DateInput => "Date Input",
            FieldType::TimeInput => "Time Input",
            FieldType::DateTimeInput => "DateTime Input",
            FieldType::Checkbox => "Checkbox",
            FieldType::RadioButton => "Radio Button",
            FieldType::DropdownSelect => "Dropdown Select",
            FieldType::MultiSelect => "Multi_Select",
            FieldType::FileUpload => "File Upload",
            FieldType::ImageUpload => "Image Upload",
            FieldType::VideoUpload => "Video Upload",
            FieldType::DocumentUpload => "Document Upload",
            FieldType::UrlInput => "URL Input",
            FieldType::PasswordInput => "Password Input",
            FieldType::ColorPicker => "Color Picker",
            FieldType::Rating => "Rating",
            FieldType::Slider => "Slider",
            FieldType::ToggleSwitch => "Toggle Switch",
            FieldType::CurrencyInput => "Currency Input",
            FieldType::PercentageInput => "Percentage Input",
            FieldType::SignaturePad => "Signature Pad",
            FieldType::LocationPicker => "Location Picker",
            FieldType::AddressInput => "Address Input",
            FieldType::VoiceRecord => "Voice Record",
        }
    }

    /// Look up a type by its stored name. Returns `None` for names outside
    /// the catalogue.
    pub fn from_name(name: &str) -> Option<FieldType> {
        let name = name.trim();
        FieldType::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Types whose `min`/`max` rules compare magnitude instead of length.
    pub fn is_numeric_family(&self) -> bool {
        matches!(
            self,
            FieldType::NumberInput
                | FieldType::Slider
                | FieldType::CurrencyInput
                | FieldType::PercentageInput
                | FieldType::Rating
        )
    }

    /// Types whose `between` rule compares magnitude. Rating is excluded.
    pub fn is_between_numeric(&self) -> bool {
        self.is_numeric_family() && *self != FieldType::Rating
    }

    /// Blob-store directory for file-carrying types.
    pub fn upload_directory(&self) -> Option<&'static str> {
        match self {
            FieldType::FileUpload => Some("files"),
            FieldType::ImageUpload => Some("images"),
            FieldType::VideoUpload => Some("videos"),
            FieldType::DocumentUpload => Some("documents"),
            FieldType::VoiceRecord => Some("voice-recordings"),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_round_trips() {
        for t in FieldType::ALL {
            assert_eq!(FieldType::from_name(t.name()), Some(t));
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(FieldType::from_name("Hologram Input"), None);
        assert_eq!(FieldType::from_name("text input"), None);
    }

    #[test]
    fn rating_is_numeric_for_min_max_only() {
        assert!(FieldType::Rating.is_numeric_family());
        assert!(!FieldType::Rating.is_between_numeric());
        assert!(FieldType::Slider.is_between_numeric());
        assert!(!FieldType::TextInput.is_numeric_family());
    }
}
