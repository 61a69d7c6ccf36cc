// Breakpoint tools schema definitions
//
// MCP tools for targets, breakpoints, source maps and process events

use crate::protocol::Tool;
use serde_json::{json, Value};

// Every tool accepts an optional target; the current one is used otherwise
fn target_id() -> Value {
    json!({
        "type": "integer",
        "description": "Target ID (optional, defaults to the current target)"
    })
}

fn breakpoint_refs() -> Value {
    json!({
        "type": "array",
        "items": {"type": ["string", "integer"]},
        "description": "Breakpoint IDs or breakpoint names (e.g., [1, \"MyBKPTS\"])"
    })
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "target.create".to_string(),
            description: "Create a debug target and make it current".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Executable name (e.g., 'a.out')",
                        "default": "a.out"
                    },
                    "modules": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Module description files to load right away"
                    },
                    "settings": {
                        "type": "object",
                        "description": "Target settings",
                        "properties": {
                            "auto_source_map_relative": {"type": "boolean", "default": true},
                            "move_to_nearest_code": {"type": "boolean", "default": true},
                            "skip_prologue": {"type": "boolean", "default": true},
                            "source_map": {
                                "type": "array",
                                "items": {"type": "array", "items": {"type": "string"}},
                                "description": "Initial [original, replacement] pairs"
                            }
                        }
                    }
                }
            }),
        },
        Tool {
            name: "target.select".to_string(),
            description: "Make a target current".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_id": {"type": "integer", "description": "Target ID"}
                },
                "required": ["target_id"]
            }),
        },
        Tool {
            name: "target.delete".to_string(),
            description: "Delete a target and its breakpoints".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_id": {"type": "integer", "description": "Target ID"}
                },
                "required": ["target_id"]
            }),
        },
        Tool {
            name: "target.load_module".to_string(),
            description: "Load a module (debug info description) into the target".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to a module description JSON file"
                    },
                    "module": {
                        "type": "object",
                        "description": "Inline module description (used when 'path' is omitted)"
                    },
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "target.unload_module".to_string(),
            description: "Unload a module, removing breakpoint locations inside it".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Module name"
                    },
                    "target_id": target_id()
                },
                "required": ["name"]
            }),
        },
        Tool {
            name: "breakpoint.set".to_string(),
            description: "Set a breakpoint by file and line, symbol name, symbol regex or source regex".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Source file, full or partial path (optional, defaults to the file defining main)"
                    },
                    "line": {"type": "integer", "description": "Line number"},
                    "column": {"type": "integer", "description": "Column (optional)"},
                    "exact_match": {
                        "type": "boolean",
                        "description": "Do not move to the next line with code",
                        "default": false
                    },
                    "name": {"type": "string", "description": "Function name"},
                    "regex": {"type": "string", "description": "Function name regular expression"},
                    "source_regex": {"type": "string", "description": "Regular expression over source lines"},
                    "files": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict symbol and source regex breakpoints to these files"
                    },
                    "names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Breakpoint names to add"
                    },
                    "disabled": {"type": "boolean", "default": false},
                    "commands": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Commands to run when hit"
                    },
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "breakpoint.list".to_string(),
            description: "List breakpoints with their locations".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "verbose": {
                        "type": "boolean",
                        "description": "Include locations",
                        "default": true
                    },
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "breakpoint.delete".to_string(),
            description: "Delete breakpoints, all breakpoints, or all disabled breakpoints".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "disabled": {
                        "type": "boolean",
                        "description": "Delete every disabled breakpoint",
                        "default": false
                    },
                    "protect_name": {
                        "type": "string",
                        "description": "With 'disabled', keep breakpoints carrying this name"
                    },
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "breakpoint.enable".to_string(),
            description: "Enable breakpoints (all if none given)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "breakpoint.disable".to_string(),
            description: "Disable breakpoints (all if none given)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "breakpoint.name_add".to_string(),
            description: "Add a name to breakpoints".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Name to add"},
                    "breakpoints": breakpoint_refs(),
                    "target_id": target_id()
                },
                "required": ["name", "breakpoints"]
            }),
        },
        Tool {
            name: "breakpoint.command_add".to_string(),
            description: "Attach commands or a script callback to breakpoints, replacing any previous one".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "commands": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Debugger commands"
                    },
                    "script": {
                        "type": "string",
                        "description": "One-line script body"
                    },
                    "function": {
                        "type": "string",
                        "description": "Script function name (e.g., 'bktptcmd.function')"
                    },
                    "target_id": target_id()
                },
                "required": ["breakpoints"]
            }),
        },
        Tool {
            name: "breakpoint.command_delete".to_string(),
            description: "Remove commands from breakpoints".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoints": breakpoint_refs(),
                    "target_id": target_id()
                },
                "required": ["breakpoints"]
            }),
        },
        Tool {
            name: "breakpoint.command_list".to_string(),
            description: "Show the commands attached to a breakpoint".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "breakpoint": {
                        "type": ["string", "integer"],
                        "description": "Breakpoint ID or name"
                    },
                    "target_id": target_id()
                },
                "required": ["breakpoint"]
            }),
        },
        Tool {
            name: "source_map.get".to_string(),
            description: "Show the source map as [original, replacement] pairs".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "source_map.set".to_string(),
            description: "Replace the source map".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pairs": {
                        "type": "array",
                        "items": {"type": "array", "items": {"type": "string"}},
                        "description": "[original, replacement] pairs, first match wins"
                    },
                    "target_id": target_id()
                },
                "required": ["pairs"]
            }),
        },
        Tool {
            name: "source_map.clear".to_string(),
            description: "Remove every source map entry".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "process.launch".to_string(),
            description: "Start a run: installs enabled locations and resets hit counts".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "process.hit".to_string(),
            description: "Report a stop at an address".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "address": {
                        "type": ["string", "integer"],
                        "description": "Stop address (e.g., '0x100003fb0')"
                    },
                    "module": {
                        "type": "string",
                        "description": "Module the stop happened in (optional, all modules otherwise)"
                    },
                    "target_id": target_id()
                },
                "required": ["address"]
            }),
        },
        Tool {
            name: "process.exit".to_string(),
            description: "Report process exit".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "status": {"type": "integer", "default": 0},
                    "target_id": target_id()
                }
            }),
        },
        Tool {
            name: "statistics.dump".to_string(),
            description: "Dump per-target statistics as JSON".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}
