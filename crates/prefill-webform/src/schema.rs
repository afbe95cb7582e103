//! Header check against the scope's known fields.
//!
//! One shared column is enough for a header to pass. Column types and the
//! remaining columns are not checked.

use crate::collaborators::FormDefinitions;

/// Header columns that are also fields of `scope`, in header order.
///
/// A failing form lookup is logged and yields no matches.
pub fn matching_fields(forms: &dyn FormDefinitions, scope: &str, header: &[String]) -> Vec<String> {
    let known = match forms.field_names(scope) {
        Ok(names) => names,
        Err(e) => {
            log::error!("Cannot load fields of '{}': {}", scope, e);
            return Vec::new();
        }
    };
    header.iter().filter(|column| known.contains(column)).cloned().collect()
}

/// True when at least one header column is a known field of `scope`.
pub fn validate(forms: &dyn FormDefinitions, scope: &str, header: &[String]) -> bool {
    !matching_fields(forms, scope, header).is_empty()
}
