// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! `{{ name }}` placeholder substitution through nested documents.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{OperatorError, Result};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Values available to templates
pub type Values = BTreeMap<String, String>;

/// Replace every placeholder in every string of `doc`, in place.
/// Map keys are left alone. Fails on the first placeholder without a value.
pub fn substitute(doc: &mut Value, values: &Values, template: &str) -> Result<()> {
    match doc {
        Value::String(s) => {
            if let Some(replaced) = substitute_str(s, values, template)? {
                *s = replaced;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| substitute(item, values, template)),
        Value::Object(map) => map
            .values_mut()
            .try_for_each(|item| substitute(item, values, template)),
        _ => Ok(()),
    }
}

fn substitute_str(s: &str, values: &Values, template: &str) -> Result<Option<String>> {
    let re = placeholder();
    if !re.is_match(s) {
        return Ok(None);
    }

    if let Some(missing) = re
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .find(|name| !values.contains_key(name))
    {
        return Err(OperatorError::UnresolvedPlaceholder {
            placeholder: missing,
            template: template.to_string(),
        });
    }

    let replaced = re.replace_all(s, |c: &Captures| values[&c[1]].clone());
    Ok(Some(replaced.into_owned()))
}
