//! show command - Display one resource with its tags and links

use anyhow::{anyhow, Context as _, Result};
use serde_json::json;

use super::open_store;
use crate::cli::Context;
use crate::core::types::ResourceId;
use crate::store::ResourceStore;

/// Show a resource by id.
pub fn show(ctx: &Context, id: &str, json: bool) -> Result<()> {
    let id: ResourceId = id
        .parse()
        .with_context(|| format!("Invalid resource id '{}'", id))?;
    let store = open_store(ctx)?;
    let resource = store
        .resource_find(id)?
        .ok_or_else(|| anyhow!("Resource {} not found", id))?;
    let tags = store.tags_of(id)?;
    let links = store.link_find_all_related_by_resource(id)?;

    if json {
        let doc = json!({
            "resource": resource,
            "tags": tags,
            "links": links,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{}", resource);
    for (name, value) in &resource.properties {
        println!("  {}: {}", name, value);
    }
    if !tags.is_empty() {
        let names: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
        println!("  tags: {}", names.join(", "));
    }
    if !links.is_empty() {
        println!("  links:");
        for link in &links {
            if link.from.id == Some(id) {
                println!("    -> {} {}", link.link_type, link.to);
            } else {
                println!("    <- {} {}", link.link_type, link.from);
            }
        }
    }
    Ok(())
}
