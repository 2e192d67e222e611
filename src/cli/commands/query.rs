//! query command - List resources matching a filter

use anyhow::{bail, Context as _, Result};
use serde_json::Value;

use super::open_store;
use crate::cli::Context;
use crate::core::types::{ResourceType, TagName};
use crate::store::{ResourceQuery, ResourceStore};

/// Print the resources matching the filter, in id order.
pub fn query(
    ctx: &Context,
    resource_type: Option<&str>,
    tags: &[String],
    properties: &[String],
    json: bool,
) -> Result<()> {
    let query = build_query(resource_type, tags, properties)?;
    let store = open_store(ctx)?;
    let found = store.query(&query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    if found.is_empty() {
        if !ctx.quiet {
            println!("No resources found.");
        }
        return Ok(());
    }
    for resource in &found {
        println!(
            "{}  {}",
            resource,
            serde_json::to_string(&resource.properties)?
        );
    }
    Ok(())
}

fn build_query(
    resource_type: Option<&str>,
    tags: &[String],
    properties: &[String],
) -> Result<ResourceQuery> {
    let mut query = match resource_type {
        Some(t) => ResourceQuery::of_type(ResourceType::new(t).context("Invalid --type")?),
        None => ResourceQuery::all(),
    };
    for tag in tags {
        query = query.tagged(TagName::new(tag.as_str()).context("Invalid --tag")?);
    }
    for prop in properties {
        let (name, value) = parse_property(prop)?;
        query = query.property_equals(name, value);
    }
    Ok(query)
}

/// Parse `NAME=VALUE`. The value is read as JSON when it parses, else as
/// a plain string.
fn parse_property(arg: &str) -> Result<(String, Value)> {
    let Some((name, raw)) = arg.split_once('=') else {
        bail!("Expected NAME=VALUE, got '{}'", arg);
    };
    if name.is_empty() {
        bail!("Empty property name in '{}'", arg);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_values_prefer_json() {
        assert_eq!(
            parse_property("port=443").unwrap(),
            ("port".to_string(), Value::from(443))
        );
        assert_eq!(
            parse_property("name=h1").unwrap(),
            ("name".to_string(), Value::from("h1"))
        );
        assert_eq!(
            parse_property("ip=null").unwrap(),
            ("ip".to_string(), Value::Null)
        );
        assert_eq!(
            parse_property("expr=a=b").unwrap(),
            ("expr".to_string(), Value::from("a=b"))
        );
    }

    #[test]
    fn malformed_property_rejected() {
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }

    #[test]
    fn builds_combined_filter() {
        let q = build_query(
            Some("Machine"),
            &["prod".to_string()],
            &["name=h1".to_string()],
        )
        .unwrap();
        assert_eq!(q.resource_type.unwrap().as_str(), "Machine");
        assert_eq!(q.tags.len(), 1);
        assert_eq!(q.properties["name"], Value::from("h1"));
    }
}
