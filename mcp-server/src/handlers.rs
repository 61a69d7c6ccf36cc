// MCP request handlers
//
// Handles initialize, list tools, and breakpoint tool execution

use crate::protocol::*;
use crate::session::SessionManager;
use crate::tools;
use bkpt_core::module::parse_address;
use bkpt_core::types::TargetId;
use bkpt_core::{
    BreakpointError, BreakpointId, BreakpointRef, BreakpointSpec, CommandSource, CreateOptions, EventReply, Module,
    ScriptCallback, SymbolPattern, TargetEvent, TargetHandle, TargetSettings,
};
use serde_json::{json, Value};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

pub struct RequestHandler {
    session_manager: SessionManager,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self {
            session_manager: SessionManager::new(),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                debug!("Request cancelled");
            }
            _ => {
                warn!("Unknown notification: {}", notification.method);
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let _params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params(format!("Invalid initialize params: {}", e)))?;

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "bkpt-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Breakpoint resolution server. \
                Start with target.create and target.load_module, \
                then use breakpoint.set, breakpoint.list, source_map.get, etc."
                    .to_string(),
            ),
        };

        to_result(result)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        to_result(ListToolsResult {
            tools: tools::get_tools(),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params(format!("Invalid tool call params: {}", e)))?;

        let args = call_params.arguments;
        debug!("Calling tool {} with {}", call_params.name, args);

        // Route to appropriate handler based on tool name
        let result = match call_params.name.as_str() {
            "target.create" => self.handle_target_create(args).await,
            "target.select" => self.handle_target_select(args).await,
            "target.delete" => self.handle_target_delete(args).await,
            "target.load_module" => self.handle_load_module(args).await,
            "target.unload_module" => self.handle_unload_module(args).await,
            "breakpoint.set" => self.handle_breakpoint_set(args).await,
            "breakpoint.list" => self.handle_breakpoint_list(args).await,
            "breakpoint.delete" => self.handle_breakpoint_delete(args).await,
            "breakpoint.enable" => self.handle_breakpoint_enable(args, true).await,
            "breakpoint.disable" => self.handle_breakpoint_enable(args, false).await,
            "breakpoint.name_add" => self.handle_name_add(args).await,
            "breakpoint.command_add" => self.handle_command_add(args).await,
            "breakpoint.command_delete" => self.handle_command_delete(args).await,
            "breakpoint.command_list" => self.handle_command_list(args).await,
            "source_map.get" => self.handle_source_map_get(args).await,
            "source_map.set" => self.handle_source_map_set(args).await,
            "source_map.clear" => self.handle_source_map_clear(args).await,
            "process.launch" => self.handle_process_launch(args).await,
            "process.hit" => self.handle_process_hit(args).await,
            "process.exit" => self.handle_process_exit(args).await,
            "statistics.dump" => self.handle_statistics(args).await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        let call_result = match result {
            Ok(content) => CallToolResult {
                content: vec![ContentBlock::Text { text: content }],
                is_error: None,
            },
            Err(error) => CallToolResult {
                content: vec![ContentBlock::Text { text: error }],
                is_error: Some(true),
            },
        };
        to_result(call_result)
    }

    async fn target(&self, args: &Value) -> Result<TargetHandle, String> {
        let id = match args.get("target_id").and_then(Value::as_u64) {
            Some(id) => Some(narrow::<TargetId>("target_id", id)?),
            None => None,
        };
        self.session_manager.get_target(id).await
    }

    async fn handle_target_create(&self, args: Value) -> Result<String, String> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("a.out");

        let settings: TargetSettings = match args.get("settings") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| format!("Invalid settings: {}", e))?,
            None => TargetSettings::default(),
        };

        let (id, handle) = self.session_manager.create_target(name, settings).await;
        let mut output = format!("Current executable set to '{}' (target: {}).\n", name, id);

        if let Some(paths) = args.get("modules").and_then(Value::as_array) {
            for path in paths.iter().filter_map(Value::as_str) {
                let module = Module::from_json_file(path)
                    .map_err(|e| format!("Failed to load module: {}", e))?;
                output.push_str(&load_module(&handle, module).await?);
            }
        }

        Ok(output)
    }

    async fn handle_target_select(&self, args: Value) -> Result<String, String> {
        let id = required_target_id(&args)?;
        self.session_manager.select_target(id).await?;
        Ok(format!("Current target set to {}.", id))
    }

    async fn handle_target_delete(&self, args: Value) -> Result<String, String> {
        let id = required_target_id(&args)?;
        self.session_manager.remove_target(id).await?;
        Ok(format!("Target {} deleted.", id))
    }

    async fn handle_load_module(&self, args: Value) -> Result<String, String> {
        let handle = self.target(&args).await?;

        let module = match (args.get("path").and_then(Value::as_str), args.get("module")) {
            (Some(path), _) => Module::from_json_file(path),
            (None, Some(inline)) => serde_json::from_value::<Module>(inline.clone()).map_err(BreakpointError::from),
            (None, None) => return Err("Missing 'path' or 'module' parameter".to_string()),
        }
        .map_err(|e| format!("Failed to load module: {}", e))?;

        load_module(&handle, module).await
    }

    async fn handle_unload_module(&self, args: Value) -> Result<String, String> {
        let name = required_str(&args, "name")?;
        let handle = self.target(&args).await?;

        match handle
            .events
            .send_event(TargetEvent::ModuleUnloaded(name.to_string()))
            .await
            .map_err(|e| e.to_string())?
        {
            EventReply::ModuleUnloaded { locations_removed } => Ok(format!(
                "Unloaded {} ({} breakpoint locations removed)",
                name, locations_removed
            )),
            other => Err(format!("Unexpected reply: {:?}", other)),
        }
    }

    async fn handle_breakpoint_set(&self, args: Value) -> Result<String, String> {
        let spec = parse_spec(&args)?;
        let options = CreateOptions {
            names: string_list(&args, "names"),
            enabled: !args.get("disabled").and_then(Value::as_bool).unwrap_or(false),
            commands: parse_command_source(&args),
        };

        let handle = self.target(&args).await?;
        let mut target = handle.target.lock().await;
        let id = target
            .create_breakpoint(spec, options)
            .map_err(|e| e.to_string())?;

        Ok(describe_new_breakpoint(&target, id))
    }

    async fn handle_breakpoint_list(&self, args: Value) -> Result<String, String> {
        let verbose = args.get("verbose").and_then(Value::as_bool).unwrap_or(true);
        let handle = self.target(&args).await?;
        let target = handle.target.lock().await;

        if let Some(tokens) = args.get("breakpoints") {
            let refs = parse_refs(tokens)?;
            let ids = target.registry().find_ids(&refs).map_err(|e| e.to_string())?;
            return Ok(ids
                .iter()
                .filter_map(|id| target.registry().get(*id))
                .map(|bp| bp.describe(verbose))
                .collect());
        }

        Ok(target.registry().list(verbose))
    }

    async fn handle_breakpoint_delete(&self, args: Value) -> Result<String, String> {
        let handle = self.target(&args).await?;
        let mut target = handle.target.lock().await;

        if args.get("disabled").and_then(Value::as_bool).unwrap_or(false) {
            let protect = args.get("protect_name").and_then(Value::as_str);
            let deleted = target.registry_mut().delete_disabled(protect);
            return Ok(format!("{} breakpoints deleted; 0 breakpoint locations disabled.", deleted.len()));
        }

        match args.get("breakpoints") {
            Some(tokens) => {
                let refs = parse_refs(tokens)?;
                let deleted = target.registry_mut().delete(&refs).map_err(|e| e.to_string())?;
                Ok(format!("{} breakpoints deleted; 0 breakpoint locations disabled.", deleted.len()))
            }
            None => {
                let count = target.registry_mut().delete_all();
                Ok(format!("All breakpoints removed. ({} breakpoints)", count))
            }
        }
    }

    async fn handle_breakpoint_enable(&self, args: Value, enabled: bool) -> Result<String, String> {
        let handle = self.target(&args).await?;
        let mut target = handle.target.lock().await;

        let refs = match args.get("breakpoints") {
            Some(tokens) => parse_refs(tokens)?,
            None => target.registry().iter().map(|bp| BreakpointRef::from(bp.id)).collect(),
        };
        let ids = target.set_enabled(&refs, enabled).map_err(|e| e.to_string())?;

        Ok(format!(
            "{} breakpoints {}.",
            ids.len(),
            if enabled { "enabled" } else { "disabled" }
        ))
    }

    async fn handle_name_add(&self, args: Value) -> Result<String, String> {
        let name = required_str(&args, "name")?;
        let refs = parse_refs(args.get("breakpoints").unwrap_or(&Value::Null))?;
        let handle = self.target(&args).await?;

        let ids = handle
            .target
            .lock()
            .await
            .registry_mut()
            .add_name(&refs, name)
            .map_err(|e| e.to_string())?;
        Ok(format!("Name '{}' added to {} breakpoints.", name, ids.len()))
    }

    async fn handle_command_add(&self, args: Value) -> Result<String, String> {
        let refs = parse_refs(args.get("breakpoints").unwrap_or(&Value::Null))?;
        let source = parse_command_source(&args).unwrap_or_default();
        let handle = self.target(&args).await?;

        let ids = handle
            .target
            .lock()
            .await
            .registry_mut()
            .attach_commands(&refs, source)
            .map_err(|e| e.to_string())?;
        Ok(format!("Commands attached to {} breakpoints.", ids.len()))
    }

    async fn handle_command_delete(&self, args: Value) -> Result<String, String> {
        let refs = parse_refs(args.get("breakpoints").unwrap_or(&Value::Null))?;
        let handle = self.target(&args).await?;

        let ids = handle
            .target
            .lock()
            .await
            .registry_mut()
            .detach_commands(&refs)
            .map_err(|e| e.to_string())?;
        Ok(format!("Commands removed from {} breakpoints.", ids.len()))
    }

    async fn handle_command_list(&self, args: Value) -> Result<String, String> {
        let token = args
            .get("breakpoint")
            .map(ref_token)
            .transpose()?
            .ok_or_else(|| "Missing 'breakpoint' parameter".to_string())?;
        let handle = self.target(&args).await?;

        let target = handle.target.lock().await;
        target
            .registry()
            .command_list(&BreakpointRef::parse(&token))
            .map_err(|e| e.to_string())
    }

    async fn handle_source_map_get(&self, args: Value) -> Result<String, String> {
        let handle = self.target(&args).await?;
        let target = handle.target.lock().await;
        Ok(target.source_map().to_json().to_string())
    }

    async fn handle_source_map_set(&self, args: Value) -> Result<String, String> {
        let pairs = args
            .get("pairs")
            .ok_or_else(|| "Missing 'pairs' parameter".to_string())?;
        let handle = self.target(&args).await?;

        let mut target = handle.target.lock().await;
        target.set_source_map_json(pairs).map_err(|e| e.to_string())?;
        Ok(target.source_map().to_json().to_string())
    }

    async fn handle_source_map_clear(&self, args: Value) -> Result<String, String> {
        let handle = self.target(&args).await?;
        handle.target.lock().await.clear_source_map();
        Ok("[]".to_string())
    }

    async fn handle_process_launch(&self, args: Value) -> Result<String, String> {
        let handle = self.target(&args).await?;
        match handle
            .events
            .send_event(TargetEvent::ProcessLaunched)
            .await
            .map_err(|e| e.to_string())?
        {
            EventReply::Launched { run } => Ok(format!("Process launched (run {}).", run)),
            other => Err(format!("Unexpected reply: {:?}", other)),
        }
    }

    async fn handle_process_hit(&self, args: Value) -> Result<String, String> {
        let address = match args.get("address") {
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| format!("Invalid address: {}", n))?,
            Some(Value::String(s)) => parse_address(s).map_err(|e| format!("Invalid address '{}': {}", s, e))?,
            _ => return Err("Missing 'address' parameter".to_string()),
        };
        let module = args.get("module").and_then(Value::as_str).map(str::to_string);
        let handle = self.target(&args).await?;

        let hits = match handle
            .events
            .send_event(TargetEvent::BreakpointHit { address, module })
            .await
            .map_err(|e| e.to_string())?
        {
            EventReply::Stopped { hits } => hits,
            other => return Err(format!("Unexpected reply: {:?}", other)),
        };

        if hits.is_empty() {
            return Ok(format!("No breakpoint location at {:#x}.", address));
        }

        let mut output = String::new();
        for hit in hits {
            let _ = writeln!(
                output,
                "Process stopped: breakpoint {} (hit count = {})",
                hit.location, hit.hit_count
            );
        }
        Ok(output)
    }

    async fn handle_process_exit(&self, args: Value) -> Result<String, String> {
        let status = args.get("status").and_then(Value::as_i64).unwrap_or(0);
        let status = i32::try_from(status).map_err(|_| format!("Invalid 'status': {}", status))?;
        let handle = self.target(&args).await?;

        handle
            .events
            .send_event(TargetEvent::ProcessExited { status })
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("Process exited with status = {}", status))
    }

    async fn handle_statistics(&self, _args: Value) -> Result<String, String> {
        let stats = self.session_manager.debugger().statistics().await;
        serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())
    }
}

async fn load_module(handle: &TargetHandle, module: Module) -> Result<String, String> {
    let name = module.name.clone();
    match handle
        .events
        .send_event(TargetEvent::ModuleLoaded(module))
        .await
        .map_err(|e| e.to_string())?
    {
        EventReply::ModuleLoaded { locations_added } => Ok(format!(
            "Loaded {} ({} breakpoint locations added)\n",
            name, locations_added
        )),
        other => Err(format!("Unexpected reply: {:?}", other)),
    }
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError {
        code: INVALID_REQUEST,
        message: format!("Failed to encode result: {}", e),
        data: None,
    })
}

fn invalid_params(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message,
        data: None,
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing '{}' parameter", key))
}

fn required_target_id(args: &Value) -> Result<TargetId, String> {
    let id = args
        .get("target_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| "Missing 'target_id' parameter".to_string())?;
    narrow("target_id", id)
}

// JSON integers arrive as u64; out-of-range values are rejected, not truncated
fn narrow<T: TryFrom<u64>>(key: &str, value: u64) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("Invalid '{}': {} is out of range", key, value))
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn ref_token(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("Invalid breakpoint reference: {}", other)),
    }
}

// Breakpoint IDs or names, as a single token or a list
fn parse_refs(value: &Value) -> Result<Vec<BreakpointRef>, String> {
    let tokens = match value {
        Value::Array(items) => items.iter().map(ref_token).collect::<Result<Vec<_>, _>>()?,
        Value::Null => return Err("Missing 'breakpoints' parameter".to_string()),
        other => vec![ref_token(other)?],
    };
    Ok(tokens.iter().map(|t| BreakpointRef::parse(t)).collect())
}

fn parse_spec(args: &Value) -> Result<BreakpointSpec, String> {
    let files = string_list(args, "files");

    if let Some(name) = args.get("name").and_then(Value::as_str) {
        return Ok(BreakpointSpec::Symbol {
            pattern: SymbolPattern::Name(name.to_string()),
            files,
        });
    }
    if let Some(regex) = args.get("regex").and_then(Value::as_str) {
        return Ok(BreakpointSpec::Symbol {
            pattern: SymbolPattern::Regex(regex.to_string()),
            files,
        });
    }
    if let Some(pattern) = args.get("source_regex").and_then(Value::as_str) {
        return Ok(BreakpointSpec::SourceRegex {
            pattern: pattern.to_string(),
            files,
        });
    }

    let line = args
        .get("line")
        .and_then(Value::as_u64)
        .ok_or_else(|| "Missing 'line' (or 'name', 'regex', 'source_regex') parameter".to_string())?;

    let column = match args.get("column").and_then(Value::as_u64) {
        Some(column) => Some(narrow("column", column)?),
        None => None,
    };

    Ok(BreakpointSpec::FileLine {
        file: args.get("file").and_then(Value::as_str).map(str::to_string),
        line: narrow("line", line)?,
        column,
        exact_match: args.get("exact_match").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn parse_command_source(args: &Value) -> Option<CommandSource> {
    let commands = string_list(args, "commands");
    let script = match (
        args.get("script").and_then(Value::as_str),
        args.get("function").and_then(Value::as_str),
    ) {
        (Some(body), _) => Some(ScriptCallback::OneLiner(body.to_string())),
        (None, Some(name)) => Some(ScriptCallback::Function(name.to_string())),
        (None, None) => None,
    };

    if commands.is_empty() && script.is_none() {
        return None;
    }
    Some(CommandSource { commands, script })
}

fn describe_new_breakpoint(target: &bkpt_core::Target, id: BreakpointId) -> String {
    let Some(bp) = target.registry().get(id) else {
        return format!("Breakpoint {}: no locations (pending).", id);
    };

    match bp.locations() {
        [] => format!(
            "Breakpoint {}: no locations (pending).\nWARNING:  Unable to resolve breakpoint to any actual locations.",
            id
        ),
        [location] => {
            let text = location.describe();
            let detail = text.split_once(": ").map_or(text.as_str(), |(_, rest)| rest);
            let detail = detail.split(", resolved").next().unwrap_or(detail);
            let detail = detail.split(", unresolved").next().unwrap_or(detail);
            format!("Breakpoint {}: {}", id, detail)
        }
        locations => format!("Breakpoint {}: {} locations.", id, locations.len()),
    }
}
