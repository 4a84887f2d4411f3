//! `list` and `describe`: read-only views of the catalog. Neither needs a token.

use std::fmt::Write;

use ads_core::{Catalog, Result};

use crate::args::{param_flag, DescribeArgs};

pub fn list(catalog: &Catalog) -> String {
    let width = catalog.resources.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for resource in &catalog.resources {
        let mut operations = resource.operation_names();
        if resource.name.parse::<ads_core::MediaKind>().is_ok() {
            operations.push("upload");
        }
        let _ = writeln!(out, "{:width$}  {}", resource.name, operations.join(", "));
    }
    out.trim_end().to_string()
}

pub fn describe(catalog: &Catalog, args: &DescribeArgs) -> Result<String> {
    let op = catalog.operation(&args.resource, &args.operation)?;
    let mut out = format!("{} {}\n  {} {}\n", args.resource, op.name, op.method, op.path);
    if !op.about.is_empty() {
        let _ = writeln!(out, "  {}", op.about);
    }
    if !op.query.is_empty() {
        let fixed: Vec<String> = op.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let _ = writeln!(out, "  query: {}", fixed.join("&"));
    }
    for (name, value) in &op.headers {
        let _ = writeln!(out, "  header: {name}: {value}");
    }
    if op.needs_id() {
        let _ = writeln!(out, "  --id required");
    }
    if !op.params.is_empty() {
        out.push_str("  params:\n");
        for spec in &op.params {
            let required = if spec.required { " required" } else { "" };
            let _ = writeln!(
                out,
                "    {} ({}){required}  --{}",
                spec.name,
                spec.kind.as_str(),
                param_flag(&spec.name)
            );
        }
    }
    if op.returns_id {
        out.push_str("  returns the new id in x-restli-id\n");
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe_args(resource: &str, operation: &str) -> DescribeArgs {
        DescribeArgs {
            resource: resource.to_string(),
            operation: operation.to_string(),
        }
    }

    #[test]
    fn list_names_every_resource_and_upload_for_media() {
        let catalog = Catalog::builtin().unwrap();
        let text = list(&catalog);
        assert_eq!(text.lines().count(), catalog.resources.len());
        let video = text.lines().find(|l| l.starts_with("video ")).unwrap();
        assert!(video.ends_with("get, upload"));
        let campaign = text.lines().find(|l| l.starts_with("campaign ")).unwrap();
        assert!(!campaign.contains("upload"));
    }

    #[test]
    fn describe_shows_path_and_params() {
        let catalog = Catalog::builtin().unwrap();
        let text = describe(&catalog, &describe_args("analytics", "query")).unwrap();
        assert!(text.starts_with("analytics query\n  GET /adAnalytics"));
        assert!(text.contains("query: q=analytics"));
        assert!(text.contains("campaigns (list<urn>)"));
        assert!(text.contains("dateRange (complex) required  --date-range"));
    }

    #[test]
    fn describe_unknown_operation_fails() {
        let catalog = Catalog::builtin().unwrap();
        let err = describe(&catalog, &describe_args("campaign", "explode")).unwrap_err();
        assert!(err.to_string().contains("unknown operation explode"));
    }
}
