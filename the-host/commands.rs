//! Requests Neovim can send to the host.
//!
//! Every command answers `{ ok = true, result = ... }` or
//! `{ ok = false, error = "..." }`; a failing command never fails the rpc
//! itself.

use anyhow::{
  Context as _,
  Result,
  anyhow,
  bail,
};
use serde::de::DeserializeOwned;
use serde_json::{
  Map,
  Value,
  json,
};
use the_render::VNode;
use the_router::BufferQuery;
use tracing::{
  debug,
  warn,
};

use crate::{
  context::HostContext,
  notify::Level,
};

pub const COMMANDS: &[&str] = &[
  "createBuffer",
  "deleteBuffer",
  "switchBuffer",
  "getCurrentBuffer",
  "getBufferInfo",
  "renderBuffer",
  "receiveBridgeMessage",
];

pub fn success(result: Value) -> Value {
  json!({ "ok": true, "result": result })
}

pub fn failure(error: impl std::fmt::Display) -> Value {
  json!({ "ok": false, "error": error.to_string() })
}

/// Run command `name` and convert the outcome into the reply shape. Failures
/// are also shown to the user.
pub async fn dispatch(context: &HostContext, name: &str, args: Vec<Value>) -> Value {
  debug!(command = name, args = args.len(), "command");
  match execute(context, name, &args).await {
    Ok(result) => success(result),
    Err(err) => {
      let message = format!("{name}: {err:#}");
      warn!(command = name, error = %format!("{err:#}"), "command failed");
      context.notifier.notify(Level::Error, &message).await;
      failure(message)
    },
  }
}

async fn execute(context: &HostContext, name: &str, args: &[Value]) -> Result<Value> {
  match name {
    "createBuffer" => {
      let path: String = arg(args, 0, "path")?;
      let query = query_arg(args.get(1))?;
      let id = context
        .router
        .create_buffer(&path, BufferQuery::from_props(query))
        .await?;
      Ok(id.map(Value::String).unwrap_or(Value::Null))
    },
    "deleteBuffer" => {
      let id: String = arg(args, 0, "id")?;
      Ok(Value::Bool(context.router.delete_buffer(&id).await?))
    },
    "switchBuffer" => {
      let identifier: String = arg(args, 0, "identifier")?;
      Ok(Value::Bool(context.router.switch_buffer(&identifier).await?))
    },
    "getCurrentBuffer" => {
      let route = context.router.get_current_buffer().await?;
      Ok(serde_json::to_value(route)?)
    },
    "getBufferInfo" => {
      let id: String = arg(args, 0, "id")?;
      let route = context.router.get_buffer_info(&id).await?;
      Ok(serde_json::to_value(route)?)
    },
    "renderBuffer" => {
      let id: String = arg(args, 0, "id")?;
      let node: VNode = arg(args, 1, "node")?;
      Ok(Value::Bool(context.renderer.render(&id, &node).await?))
    },
    "receiveBridgeMessage" => {
      let message: String = arg(args, 0, "message")?;
      context.bridge.receive_message(&message).await;
      Ok(Value::Null)
    },
    _ => Err(anyhow!("unknown command")),
  }
}

fn arg<T: DeserializeOwned>(args: &[Value], idx: usize, name: &str) -> Result<T> {
  let value = args.get(idx).cloned().unwrap_or(Value::Null);
  serde_json::from_value(value).with_context(|| format!("invalid argument `{name}`"))
}

// Neovim sends an empty Lua table as an array.
fn query_arg(value: Option<&Value>) -> Result<Map<String, Value>> {
  match value {
    None | Some(Value::Null) => Ok(Map::new()),
    Some(Value::Object(map)) => Ok(map.clone()),
    Some(Value::Array(items)) if items.is_empty() => Ok(Map::new()),
    Some(other) => bail!("invalid argument `query`: expected a table, got {other}"),
  }
}
