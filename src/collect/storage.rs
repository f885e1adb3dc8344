//! Cloud Storage collector
//!
//! Bucket configuration comes from `gcloud storage`; lifecycle, IAM, CORS and
//! usage figures come from `gsutil`, whose text output is parsed leniently.

use super::{CollectContext, Collector};
use crate::gcp::projects::Project;
use crate::resource::fields::{self, NOT_AVAILABLE};
use crate::resource::{Assessment, Domain, Record};
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{json, Value};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_TB: f64 = BYTES_PER_GB * 1024.0;

pub struct StorageCollector;

impl Collector for StorageCollector {
    fn domain(&self) -> Domain {
        Domain::Storage
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a CollectContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<Assessment>> {
        Box::pin(collect_project(ctx, project))
    }
}

async fn collect_project(ctx: &CollectContext, project: &Project) -> Result<Assessment> {
    let cli = &ctx.cli;
    tracing::info!("Assessing storage for project: {}", project.project_id);

    let response = cli
        .query(&cli.gcloud([
            "storage".to_string(),
            "buckets".to_string(),
            "list".to_string(),
            format!("--project={}", project.project_id),
            "--format=json".to_string(),
        ]))
        .await;

    let mut buckets = Vec::new();
    for bucket in fields::items(&response) {
        let name = fields::text(bucket, "name");
        buckets.push(bucket_record(ctx, project, &name).await);
    }
    cli.pause().await;

    let mut usage = Vec::with_capacity(buckets.len());
    for bucket in &buckets {
        usage.push(usage_record(ctx, project, bucket).await);
        cli.pause().await;
    }

    let mut assessment = Assessment::new();
    assessment.extend("buckets", buckets);
    assessment.extend("bucket_usage", usage);
    Ok(assessment)
}

/// `gsutil <args>` stdout parsed as JSON; any failure is `None`
async fn gsutil_json(ctx: &CollectContext, args: [&str; 3]) -> Option<Value> {
    let cli = &ctx.cli;
    let output = cli.query_text(&cli.gsutil(args)).await;
    if output.is_empty() {
        return None;
    }
    serde_json::from_str(&output).ok()
}

async fn bucket_record(ctx: &CollectContext, project: &Project, bucket_name: &str) -> Record {
    let cli = &ctx.cli;
    let url = format!("gs://{}", bucket_name);

    let mut details = cli
        .query(&cli.gcloud(["storage", "buckets", "describe", url.as_str(), "--format=json"]))
        .await;
    if !details.is_object() {
        details = json!({ "name": bucket_name });
    }

    let lifecycle = gsutil_json(ctx, ["lifecycle", "get", url.as_str()]).await;
    let iam = gsutil_json(ctx, ["iam", "get", url.as_str()]).await;
    let cors = gsutil_json(ctx, ["cors", "get", url.as_str()]).await;

    let lifecycle_rules = lifecycle.as_ref().map_or(0, |l| fields::count(l, "rule"));
    let iam_bindings = iam.as_ref().map_or(0, |p| fields::count(p, "bindings"));
    let cors_rules = cors
        .as_ref()
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    ctx.base_record(project)
        .with("bucket_name", bucket_name)
        .with("location", fields::text(&details, "location"))
        .with("location_type", fields::text(&details, "locationType"))
        .with("storage_class", fields::text(&details, "storageClass"))
        .with("versioning_enabled", fields::flag(&details, "versioning.enabled"))
        .with("lifecycle_rules_count", lifecycle_rules.to_string())
        .with(
            "public_access_prevention",
            fields::text(&details, "publicAccessPrevention"),
        )
        .with(
            "uniform_bucket_level_access",
            fields::flag(&details, "uniformBucketLevelAccess.enabled"),
        )
        .with("retention_policy", fields::json_object(&details, "retentionPolicy"))
        .with(
            "encryption_type",
            fields::text_or(&details, "encryption.defaultKmsKeyName", "Google-managed"),
        )
        .with("cors_enabled", fields::bool_label(cors_rules > 0))
        .with("labels", fields::json_object(&details, "labels"))
        .with("creation_time", fields::text(&details, "timeCreated"))
        .with("updated_time", fields::text(&details, "updated"))
        .with("iam_members_count", iam_bindings.to_string())
        .with("website_config", fields::json_object(&details, "website"))
}

async fn usage_record(ctx: &CollectContext, project: &Project, bucket: &Record) -> Record {
    let cli = &ctx.cli;
    let bucket_name = bucket.get("bucket_name").unwrap_or(NOT_AVAILABLE);
    let url = format!("gs://{}", bucket_name);

    let du = cli.query_text(&cli.gsutil(["du", "-s", url.as_str()])).await;
    let total_size_bytes = parse_du_bytes(&du);

    let objects = format!("{}/**", url);
    let listing = cli.query_text(&cli.gsutil(["ls", "-l", objects.as_str()])).await;
    let object_count = count_listed_objects(&listing);

    ctx.base_record(project)
        .with("bucket_name", bucket_name)
        .with("total_size_bytes", total_size_bytes.to_string())
        .with("total_size_gb", size_in(total_size_bytes, BYTES_PER_GB, 2))
        .with("total_size_tb", size_in(total_size_bytes, BYTES_PER_TB, 4))
        .with("object_count", object_count.to_string())
        .with("storage_class", bucket.get("storage_class").unwrap_or(NOT_AVAILABLE))
        .with("location", bucket.get("location").unwrap_or(NOT_AVAILABLE))
        .with("assessment_date", ctx.timestamp())
}

/// Bytes from `gsutil du -s` output (`<bytes>  gs://<bucket>`); 0 if unparseable
pub fn parse_du_bytes(output: &str) -> u64 {
    let mut parts = output.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(bytes), Some(_)) => bytes.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Object lines of `gsutil ls -l`, excluding the `TOTAL:` summary
pub fn count_listed_objects(output: &str) -> usize {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("TOTAL:"))
        .count()
}

/// Size in a larger unit, rounded; `0` for empty buckets
pub fn size_in(bytes: u64, unit: f64, decimals: i32) -> String {
    if bytes == 0 {
        return "0".to_string();
    }
    fields::format_float(fields::round_to(bytes as f64 / unit, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_du_bytes() {
        assert_eq!(parse_du_bytes("5368709120  gs://my-bucket"), 5_368_709_120);
        assert_eq!(parse_du_bytes("5368709120"), 0);
        assert_eq!(parse_du_bytes(""), 0);
        assert_eq!(parse_du_bytes("CommandException: oops"), 0);
    }

    #[test]
    fn test_count_listed_objects() {
        let listing = "\
      1024  2024-01-10T10:00:00Z  gs://b/a.txt
      2048  2024-01-10T10:00:00Z  gs://b/dir/b.txt

TOTAL: 2 objects, 3072 bytes (3 KiB)";
        assert_eq!(count_listed_objects(listing), 2);
        assert_eq!(count_listed_objects(""), 0);
    }

    #[test]
    fn test_size_in_units() {
        assert_eq!(size_in(0, BYTES_PER_GB, 2), "0");
        assert_eq!(size_in(5_368_709_120, BYTES_PER_GB, 2), "5.0");
        assert_eq!(size_in(1_610_612_736, BYTES_PER_GB, 2), "1.5");
        assert_eq!(size_in(5_368_709_120, BYTES_PER_TB, 4), "0.0049");
    }
}
