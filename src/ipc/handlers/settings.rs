use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    referential_defaults, require_conn, str_param, HandlerErr, ReferentialPolicy, REFERENTIAL_KEY,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SettingsSection {
    Referential,
}

impl SettingsSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "referential" => Some(Self::Referential),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Referential => REFERENTIAL_KEY,
        }
    }

    fn defaults(self) -> Value {
        match self {
            Self::Referential => referential_defaults(ReferentialPolicy::Lenient),
        }
    }
}

fn load_section(
    conn: &rusqlite::Connection,
    section: SettingsSection,
) -> Result<Value, HandlerErr> {
    let mut current = section.defaults();
    if let Some(saved) = db::settings_get_json(conn, section.key())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
    {
        merge_object(&mut current, &saved);
    }
    Ok(current)
}

fn merge_object(target: &mut Value, patch: &Value) {
    let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (k, v) in patch_map {
        target_map.insert(k.clone(), v.clone());
    }
}

fn validate_section(section: SettingsSection, value: &Map<String, Value>) -> Result<(), HandlerErr> {
    match section {
        SettingsSection::Referential => {
            if let Some(policy) = value.get("policy") {
                let valid = policy
                    .as_str()
                    .and_then(ReferentialPolicy::parse)
                    .is_some();
                if !valid {
                    return Err(HandlerErr::bad_params(
                        "policy must be 'lenient' or 'strict'",
                    ));
                }
            }
            Ok(())
        }
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let section_name = match str_param(req, "section") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(section) = SettingsSection::parse(&section_name) else {
        return err(
            &req.id,
            "bad_params",
            "unknown settings section",
            Some(json!({ "section": section_name })),
        );
    };

    match load_section(conn, section) {
        Ok(settings) => ok(&req.id, json!({ "settings": settings })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let section_name = match str_param(req, "section") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(section) = SettingsSection::parse(&section_name) else {
        return err(
            &req.id,
            "bad_params",
            "unknown settings section",
            Some(json!({ "section": section_name })),
        );
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.patch object", None);
    };

    if let Err(e) = validate_section(section, patch) {
        return e.response(&req.id);
    }

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    merge_object(&mut current, &Value::Object(patch.clone()));

    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "settings": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
