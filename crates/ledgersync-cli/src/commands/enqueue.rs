//! Enqueue command - Record a mutation for later replay
//!
//! `ledgersync enqueue customer /api/crm/customers --create --payload '{"name":"Acme"}'`
//! persists the operation locally. Nothing is sent to the backend; the
//! daemon replays it once connectivity allows.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use ledgersync_core::domain::{EntityKind, JsonObject, OperationRequest, RecordId};

use super::CliContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("op").required(true).args(["create", "update", "delete"])))]
pub struct EnqueueCommand {
    /// Entity kind: company, customer, inventory_item or sale
    pub entity: EntityKind,

    /// REST collection path, e.g. /api/crm/customers
    pub endpoint: String,

    /// Create a new record
    #[arg(long)]
    pub create: bool,

    /// Update the record with this ID
    #[arg(long, value_name = "ID")]
    pub update: Option<String>,

    /// Delete the record with this ID
    #[arg(long, value_name = "ID")]
    pub delete: Option<String>,

    /// JSON object sent as the request body (create and update)
    #[arg(long, value_name = "JSON")]
    pub payload: Option<String>,
}

impl EnqueueCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let request = self.to_request()?;

        let queue = ctx.open_queue().await?;
        let operation = queue.enqueue(request).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&operation)?);
        } else {
            formatter.success(&format!(
                "Queued {} {} #{}",
                operation.kind.name(),
                operation.entity,
                operation.id
            ));
            formatter.field("Target", &operation.resource_path());
            formatter.field("Status", operation.status.as_str());
        }
        Ok(())
    }

    fn to_request(&self) -> Result<OperationRequest> {
        let entity = self.entity;
        let endpoint = self.endpoint.clone();

        if self.create {
            let payload = self.require_payload("--create")?;
            return Ok(OperationRequest::create(entity, endpoint, payload));
        }
        if let Some(id) = &self.update {
            let payload = self.require_payload("--update")?;
            return Ok(OperationRequest::update(entity, endpoint, RecordId::new(id.as_str())?, payload));
        }
        if let Some(id) = &self.delete {
            if self.payload.is_some() {
                bail!("--payload is not accepted with --delete");
            }
            return Ok(OperationRequest::delete(entity, endpoint, RecordId::new(id.as_str())?));
        }
        bail!("One of --create, --update or --delete is required")
    }

    fn require_payload(&self, flag: &str) -> Result<JsonObject> {
        let Some(raw) = &self.payload else {
            bail!("{flag} requires --payload");
        };
        parse_payload(raw)
    }
}

fn parse_payload(raw: &str) -> Result<JsonObject> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--payload is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--payload must be a JSON object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use ledgersync_core::domain::OperationKind;

    use super::*;
    use crate::commands::test_support::temp_context;

    #[derive(Debug, Parser)]
    struct Wrapper {
        #[command(flatten)]
        cmd: EnqueueCommand,
    }

    fn parse(args: &[&str]) -> Result<EnqueueCommand, clap::Error> {
        let mut argv = vec!["enqueue"];
        argv.extend_from_slice(args);
        Wrapper::try_parse_from(argv).map(|w| w.cmd)
    }

    #[test]
    fn test_create_request() {
        let cmd = parse(&["customer", "/api/crm/customers", "--create", "--payload", r#"{"name":"Acme"}"#])
            .unwrap();
        let request = cmd.to_request().unwrap();
        assert_eq!(request.entity, EntityKind::Customer);
        assert!(matches!(request.kind, OperationKind::Create { ref payload } if payload["name"] == "Acme"));
    }

    #[test]
    fn test_update_and_delete_requests() {
        let update = parse(&["sale", "/api/sales", "--update", "S-9", "--payload", r#"{"total":10}"#])
            .unwrap()
            .to_request()
            .unwrap();
        assert_eq!(update.kind.record_id().map(RecordId::as_str), Some("S-9"));

        let delete = parse(&["company", "/api/companies", "--delete", "CO-1"])
            .unwrap()
            .to_request()
            .unwrap();
        assert_eq!(delete.kind.name(), "delete");
    }

    #[test]
    fn test_operation_flags_are_exclusive_and_required() {
        assert!(parse(&["customer", "/api/crm/customers"]).is_err());
        assert!(parse(&["customer", "/api/crm/customers", "--create", "--delete", "X"]).is_err());
        assert!(parse(&["ledger", "/api/ledger", "--delete", "X"]).is_err());
    }

    #[test]
    fn test_payload_rules() {
        let missing = parse(&["customer", "/api/crm/customers", "--create"]).unwrap();
        assert!(missing.to_request().is_err());

        let not_object = parse(&["customer", "/api/crm/customers", "--create", "--payload", "[1]"]).unwrap();
        assert!(not_object.to_request().is_err());

        let with_delete = parse(&["customer", "/api/crm/customers", "--delete", "C", "--payload", "{}"]).unwrap();
        assert!(with_delete.to_request().is_err());
    }

    #[tokio::test]
    async fn test_execute_persists_operation() {
        let (ctx, _dir) = temp_context();
        let cmd = parse(&["inventory_item", "/api/inventory/items", "--create", "--payload", r#"{"sku":"A1"}"#])
            .unwrap();

        cmd.execute(&ctx, OutputFormat::Json).await.unwrap();

        let listed = ctx.open_queue().await.unwrap().list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].entity, EntityKind::InventoryItem);
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_endpoint() {
        let (ctx, _dir) = temp_context();
        let cmd = parse(&["customer", "api/no-leading-slash", "--delete", "C-1"]).unwrap();
        assert!(cmd.execute(&ctx, OutputFormat::Human).await.is_err());
    }
}
