use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "scan": {
                "type": "object",
                "properties": {
                    "threads": { "type": "integer" },
                    "max_urls": { "type": "integer", "minimum": 1 },
                    "stages": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "all": { "type": "boolean" },
                    "options": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["discovery", "passive", "injection", "dangerous", "all"] }
                    },
                    "user_agent": { "type": "string" },
                    "ssl_verify": { "type": "boolean" },
                    "retries": { "type": "integer", "minimum": 0 }
                }
            },
            "scope": {
                "type": "object",
                "properties": {
                    "hosts": { "type": "array", "items": { "type": "string" } },
                    "options": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["subdomains", "same-scheme", "https-only"] }
                    }
                }
            },
            "login": {
                "type": "object",
                "properties": {
                    "method": { "type": "string", "enum": ["basic", "form", "form-csrf", "header"] },
                    "credentials": { "type": "string" },
                    "url": { "type": "string", "format": "uri" },
                    "data": { "type": "string" },
                    "token_url": { "type": "string", "format": "uri" },
                    "headers": { "type": "array", "items": { "type": "string" } }
                }
            },
            "browser": {
                "type": "object",
                "properties": {
                    "driver_path": { "type": "string" },
                    "show": { "type": "boolean" },
                    "interactive": { "type": "boolean" },
                    "proxy": { "type": "boolean" },
                    "proxy_port": { "type": "integer", "minimum": 1, "maximum": 65535 }
                }
            },
            "exploit": {
                "type": "object",
                "properties": {
                    "host": { "type": "string" },
                    "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "credentials": { "type": "string" },
                    "endpoint": { "type": "string" },
                    "ssl": { "type": "boolean" },
                    "autostart": { "type": "boolean" }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "database": { "type": "string" }
                }
            }
        }
    })
});
