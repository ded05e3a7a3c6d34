//! Serializer configuration.

use crate::error::Error;

/// When a property equal to its declared default is still written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultValuesPolicy {
    /// Defaults are always written.
    #[default]
    Always,
    /// Defaults are written only for value-kind properties.
    ValueTypesOnly,
    /// Defaults are written only for reference-kind properties.
    ReferenceTypesOnly,
    /// Defaults are written only for required properties.
    RequiredOnly,
    /// Defaults are never written.
    Never,
}

/// Wire layout for multidimensional arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiDimFormat {
    /// Each rank becomes a nested array.
    #[default]
    Nested,
    /// A two-element envelope: the dimension list, then the flat elements.
    FlatWithDimensions,
}

/// Case policy applied to record property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameCase {
    /// Property names are used as declared.
    #[default]
    Identity,
    /// First character lowercased.
    Camel,
    /// First character uppercased.
    Pascal,
}

impl NameCase {
    /// Apply the policy to a declared property name.
    pub fn apply(&self, name: &str) -> String {
        let mut chars = name.chars();
        match (self, chars.next()) {
            (NameCase::Identity, _) | (_, None) => name.to_owned(),
            (NameCase::Camel, Some(first)) => {
                first.to_lowercase().chain(chars).collect()
            }
            (NameCase::Pascal, Some(first)) => {
                first.to_uppercase().chain(chars).collect()
            }
        }
    }
}

/// Extension type codes this library claims for itself. All remappable per
/// serializer; the reserved negative range belongs to the format (timestamps
/// stay on `-1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionCodes {
    /// Back-reference token for reference preservation.
    pub reference: i8,
    /// Decimal payloads.
    pub decimal: i8,
}

impl Default for ExtensionCodes {
    fn default() -> Self {
        Self {
            reference: 1,
            decimal: 2,
        }
    }
}

impl ExtensionCodes {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        for code in [self.reference, self.decimal] {
            if code < 0 {
                return Err(Error::ReservedExtensionCode { code });
            }
        }
        Ok(())
    }
}

/// Options consumed by the serializer and the converter graph.
///
/// Graph-shaping options participate in converter construction; leaf options
/// (the default-values policy) are consulted at run time.
#[derive(Debug, Clone)]
pub struct SerializerOptions {
    /// Preserve object identity across the serialized graph.
    pub preserve_references: bool,
    /// Intern deserialized `Arc<str>` values.
    pub intern_strings: bool,
    /// When default-equal properties are still written.
    pub serialize_default_values: DefaultValuesPolicy,
    /// Disable bulk-copy fast paths.
    pub disable_acceleration: bool,
    /// Write unit enums by name instead of ordinal.
    pub serialize_enums_by_name: bool,
    /// Wire layout for multidimensional arrays.
    pub multidim_array_format: MultiDimFormat,
    /// Emit old-spec wire data: raw/str framing for binary, no timestamps.
    pub old_spec_compatibility: bool,
    /// Converter-call budget per (de)serialization.
    pub depth_limit: u32,
    /// Claimed extension type codes.
    pub extension_codes: ExtensionCodes,
    /// Case policy for record property names.
    pub property_name_case: NameCase,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            preserve_references: false,
            intern_strings: false,
            serialize_default_values: DefaultValuesPolicy::default(),
            disable_acceleration: false,
            serialize_enums_by_name: false,
            multidim_array_format: MultiDimFormat::default(),
            old_spec_compatibility: false,
            depth_limit: 64,
            extension_codes: ExtensionCodes::default(),
            property_name_case: NameCase::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_case_changes_only_the_first_character() {
        assert_eq!(NameCase::Identity.apply("FirstName"), "FirstName");
        assert_eq!(NameCase::Camel.apply("FirstName"), "firstName");
        assert_eq!(NameCase::Pascal.apply("firstName"), "FirstName");
        assert_eq!(NameCase::Camel.apply(""), "");
    }

    #[test]
    fn negative_library_codes_are_rejected() {
        let codes = ExtensionCodes {
            reference: -1,
            decimal: 2,
        };
        assert!(matches!(
            codes.validate(),
            Err(Error::ReservedExtensionCode { code: -1 })
        ));
        assert!(ExtensionCodes::default().validate().is_ok());
    }
}
