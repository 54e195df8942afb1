//! Page actions inferred from form groups.
//!
//! Fields and a submit button sharing one `form` section become a single
//! higher-level method. A form with a password field is a `login`; any
//! other form is `submit<Qualifier>`.

use std::collections::BTreeMap;

use autopom_core_types::{PageAction, PageActionStep, SchemaElement};
use perceiver_structural::section_kind;

const FILLABLE_ROLES: &[&str] = &["textbox", "searchbox", "combobox", "spinbutton"];

fn is_password(element: &SchemaElement) -> bool {
    let name = element.name.to_ascii_lowercase();
    let label = element.label.to_ascii_lowercase();
    name.contains("password") || label.contains("password")
}

/// Parameter name for a field: `emailInput` becomes `email`.
fn param_name(element: &SchemaElement) -> String {
    let name = element.name.as_str();
    let stem = ["Input", "Field", "Box", "Textbox"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix).filter(|s| !s.is_empty()))
        .unwrap_or(name);
    stem.to_string()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn form_method_name(section: &str) -> String {
    let qualifier: String = section
        .split_once(':')
        .map(|(_, q)| q)
        .unwrap_or("form")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();
    if qualifier.is_empty() {
        "submitForm".to_string()
    } else {
        format!("submit{qualifier}")
    }
}

/// Infer page actions from the verified elements of one state.
pub fn infer_page_actions(elements: &[SchemaElement]) -> Vec<PageAction> {
    let mut forms: BTreeMap<&str, Vec<&SchemaElement>> = BTreeMap::new();
    for element in elements.iter().filter(|e| section_kind(&e.section) == "form") {
        forms.entry(element.section.as_str()).or_default().push(element);
    }

    let mut actions = Vec::new();
    for (section, members) in forms {
        let fields: Vec<&SchemaElement> = members
            .iter()
            .copied()
            .filter(|e| FILLABLE_ROLES.contains(&e.role.as_str()))
            .collect();
        let Some(submit) = members.iter().find(|e| e.role == "button") else {
            continue;
        };
        if fields.is_empty() {
            continue;
        }

        let login = fields.iter().any(|e| is_password(e));
        let mut username_taken = false;
        let mut params = Vec::new();
        let mut steps = Vec::new();
        for field in fields {
            let param = if is_password(field) {
                "password".to_string()
            } else if login && !username_taken {
                username_taken = true;
                "username".to_string()
            } else {
                param_name(field)
            };
            if !params.contains(&param) {
                params.push(param.clone());
            }
            steps.push(PageActionStep {
                action: "fill".to_string(),
                element: field.name.clone(),
                param: Some(param),
            });
        }
        steps.push(PageActionStep {
            action: "click".to_string(),
            element: submit.name.clone(),
            param: None,
        });

        actions.push(PageAction {
            name: if login { "login".to_string() } else { form_method_name(section) },
            params,
            steps,
        });
    }
    actions
}
