//! `(var)` substitution in grant parameters.
//!
//! templates are expanded once per account when grants are compiled, e.g.
//! `(hostname).cluster` with `hostname = node7` becomes `node7.cluster`.

use std::collections::HashMap;

use crate::error::TemplateError;

/// expand every `(var)` in `within` from `vars`.
///
/// parentheses must pair up and may not nest. a variable that is missing or
/// empty is an error.
pub fn substitute_vars(
    within: &str,
    vars: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut parts = within.split('(');
    let head = parts.next().unwrap_or_default();
    if head.contains(')') {
        return Err(TemplateError::ExtraneousClose(within.to_string()));
    }

    let mut out = String::from(head);
    for part in parts {
        let mut pieces = part.split(')');
        let (Some(var), Some(text)) = (pieces.next(), pieces.next()) else {
            return Err(TemplateError::MissingClose(within.to_string()));
        };
        if pieces.next().is_some() {
            return Err(TemplateError::ExtraneousClose(within.to_string()));
        }
        match vars.get(var) {
            Some(value) if !value.is_empty() => out.push_str(value),
            _ => {
                return Err(TemplateError::UndefinedVariable {
                    var: var.to_string(),
                    within: within.to_string(),
                });
            }
        }
        out.push_str(text);
    }
    Ok(out)
}

/// expand each template in `within`.
pub fn substitute_all(
    within: &[String],
    vars: &HashMap<String, String>,
) -> Result<Vec<String>, TemplateError> {
    within.iter().map(|s| substitute_vars(s, vars)).collect()
}
