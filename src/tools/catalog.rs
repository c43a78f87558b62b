use serde_json::{json, Value};

use super::{CapabilityGroup, ToolDescriptor};

fn descriptor(
    name: &str,
    group: CapabilityGroup,
    description: &str,
    input_schema: Value,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        group,
        gated: false,
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Every tool the model can be offered, in presentation order.
pub fn default_catalog() -> Vec<ToolDescriptor> {
    let mut catalog = core_tools();
    catalog.extend(desktop_tools());
    catalog.extend(browser_tools());
    catalog
}

fn core_tools() -> Vec<ToolDescriptor> {
    use CapabilityGroup::Core;

    let mut run_command = descriptor(
        "run_command",
        Core,
        "Execute a shell command on the local machine and return its output. Use this for \
         system tasks such as listing files, checking processes, reading or writing files, \
         getting system information or running scripts. Commands run with the current user's \
         permissions. Prefer single-line commands or semicolon-separated statements.",
        object_schema(
            json!({
                "command": { "type": "string", "description": "The command to execute" }
            }),
            &["command"],
        ),
    );
    run_command.gated = true;

    vec![
        descriptor(
            "web_search",
            Core,
            "Search the web for current information, recent events, facts or relevant \
             websites. Prefer searching over guessing.",
            object_schema(
                json!({
                    "query": { "type": "string", "description": "The search query" }
                }),
                &["query"],
            ),
        ),
        descriptor(
            "fetch_webpage",
            Core,
            "Fetch the readable text of a specific URL. Use it after web_search to read a \
             page in detail, or when the user provides a URL.",
            object_schema(
                json!({
                    "url": { "type": "string", "description": "The URL to fetch" }
                }),
                &["url"],
            ),
        ),
        run_command,
    ]
}

fn desktop_tools() -> Vec<ToolDescriptor> {
    use CapabilityGroup::Desktop;

    vec![
        descriptor(
            "screenshot",
            Desktop,
            "Capture the screen, or a region of it, and return the image.",
            object_schema(
                json!({
                    "x": { "type": "integer", "description": "Left edge of the region" },
                    "y": { "type": "integer", "description": "Top edge of the region" },
                    "width": { "type": "integer", "description": "Width of the region" },
                    "height": { "type": "integer", "description": "Height of the region" }
                }),
                &[],
            ),
        ),
        descriptor(
            "mouse_click",
            Desktop,
            "Click at (x, y) using pixel positions as seen in the latest screenshot. \
             Supports left/right/middle buttons and single or double clicks.",
            object_schema(
                json!({
                    "x": { "type": "integer", "description": "X coordinate to click" },
                    "y": { "type": "integer", "description": "Y coordinate to click" },
                    "button": {
                        "type": "string",
                        "enum": ["left", "right", "middle"],
                        "description": "Mouse button (default: left)"
                    },
                    "clicks": {
                        "type": "integer",
                        "enum": [1, 2],
                        "description": "1 for single, 2 for double click (default: 1)"
                    }
                }),
                &["x", "y"],
            ),
        ),
        descriptor(
            "type_text",
            Desktop,
            "Type text at the current cursor position. Focus the input field first.",
            object_schema(
                json!({
                    "text": { "type": "string", "description": "The text to type" },
                    "interval": { "type": "number", "description": "Seconds between keystrokes (default: 0.02)" }
                }),
                &["text"],
            ),
        ),
        descriptor(
            "press_key",
            Desktop,
            "Press a key or a '+'-joined combination such as 'enter', 'ctrl+c' or 'alt+tab'.",
            object_schema(
                json!({
                    "keys": { "type": "string", "description": "Key or combination to press" }
                }),
                &["keys"],
            ),
        ),
        descriptor(
            "mouse_scroll",
            Desktop,
            "Scroll the mouse wheel; positive scrolls up, negative scrolls down. \
             Optionally scroll at a specific (x, y).",
            object_schema(
                json!({
                    "clicks": { "type": "integer", "description": "Scroll amount" },
                    "x": { "type": "integer", "description": "X coordinate (optional)" },
                    "y": { "type": "integer", "description": "Y coordinate (optional)" }
                }),
                &["clicks"],
            ),
        ),
        descriptor(
            "open_application",
            Desktop,
            "Open an application by common name (chrome, notepad, explorer, ...) or by full \
             executable path.",
            object_schema(
                json!({
                    "name": { "type": "string", "description": "Application name or executable path" }
                }),
                &["name"],
            ),
        ),
        descriptor(
            "find_window",
            Desktop,
            "Find windows whose title contains the given text and report their positions and \
             sizes. Optionally bring the first match to the foreground.",
            object_schema(
                json!({
                    "title": { "type": "string", "description": "Window title or part of it" },
                    "activate": { "type": "boolean", "description": "Focus the first match (default: false)" }
                }),
                &["title"],
            ),
        ),
        descriptor(
            "clipboard_read",
            Desktop,
            "Read the current text contents of the clipboard.",
            object_schema(json!({}), &[]),
        ),
        descriptor(
            "clipboard_write",
            Desktop,
            "Replace the clipboard contents with the given text.",
            object_schema(
                json!({
                    "text": { "type": "string", "description": "Text to place on the clipboard" }
                }),
                &["text"],
            ),
        ),
        descriptor(
            "wait_for_window",
            Desktop,
            "Wait until a window with the given title appears, or time out.",
            object_schema(
                json!({
                    "title": { "type": "string", "description": "Window title or part of it" },
                    "timeout": { "type": "number", "description": "Maximum seconds to wait (default: 10)" }
                }),
                &["title"],
            ),
        ),
        descriptor(
            "read_screen_text",
            Desktop,
            "Read text from a screen region using OCR.",
            object_schema(
                json!({
                    "x": { "type": "integer", "description": "Left edge of the region" },
                    "y": { "type": "integer", "description": "Top edge of the region" },
                    "width": { "type": "integer", "description": "Width of the region" },
                    "height": { "type": "integer", "description": "Height of the region" }
                }),
                &["x", "y", "width", "height"],
            ),
        ),
        descriptor(
            "find_image_on_screen",
            Desktop,
            "Locate a reference image on screen and return the center of the match.",
            object_schema(
                json!({
                    "image_path": { "type": "string", "description": "Absolute path of the reference image" },
                    "confidence": { "type": "number", "description": "Match threshold 0.0-1.0 (default: 0.8)" }
                }),
                &["image_path"],
            ),
        ),
        descriptor(
            "mouse_drag",
            Desktop,
            "Drag the mouse from one point to another.",
            object_schema(
                json!({
                    "start_x": { "type": "integer", "description": "Starting X coordinate" },
                    "start_y": { "type": "integer", "description": "Starting Y coordinate" },
                    "end_x": { "type": "integer", "description": "Ending X coordinate" },
                    "end_y": { "type": "integer", "description": "Ending Y coordinate" },
                    "duration": { "type": "number", "description": "Drag duration in seconds (default: 0.5)" },
                    "button": { "type": "string", "description": "Mouse button (default: left)" }
                }),
                &["start_x", "start_y", "end_x", "end_y"],
            ),
        ),
    ]
}

fn browser_tools() -> Vec<ToolDescriptor> {
    use CapabilityGroup::Browser;

    let selector = |description: &str| json!({ "type": "string", "description": description });

    vec![
        descriptor(
            "browser_open",
            Browser,
            "Connect to the user's browser (launching it if needed) and open a URL. Call this \
             before any other browser tool.",
            object_schema(
                json!({ "url": { "type": "string", "description": "The URL to open" } }),
                &["url"],
            ),
        ),
        descriptor(
            "browser_navigate",
            Browser,
            "Navigate the current page to a new URL.",
            object_schema(
                json!({ "url": { "type": "string", "description": "The URL to navigate to" } }),
                &["url"],
            ),
        ),
        descriptor(
            "browser_click",
            Browser,
            "Click an element by CSS selector, or by its visible text when no selector is given.",
            object_schema(
                json!({
                    "selector": selector("CSS selector of the element"),
                    "text": { "type": "string", "description": "Visible text of the element" }
                }),
                &[],
            ),
        ),
        descriptor(
            "browser_fill",
            Browser,
            "Clear a form field and fill it with text.",
            object_schema(
                json!({
                    "selector": selector("CSS selector of the input field"),
                    "value": { "type": "string", "description": "Text to fill in" }
                }),
                &["selector", "value"],
            ),
        ),
        descriptor(
            "browser_get_text",
            Browser,
            "Return the text of an element, or of the whole page when no selector is given.",
            object_schema(
                json!({ "selector": selector("CSS selector of the element (optional)") }),
                &[],
            ),
        ),
        descriptor(
            "browser_run_js",
            Browser,
            "Run JavaScript in the page context and return the result. Use 'return' to get a \
             value back.",
            object_schema(
                json!({ "code": { "type": "string", "description": "JavaScript to execute" } }),
                &["code"],
            ),
        ),
        descriptor(
            "browser_screenshot",
            Browser,
            "Capture the current page as an image.",
            object_schema(json!({}), &[]),
        ),
        descriptor(
            "browser_close",
            Browser,
            "Disconnect the automation session. The browser itself stays open.",
            object_schema(json!({}), &[]),
        ),
        descriptor(
            "browser_wait_for",
            Browser,
            "Wait for an element matching a selector and return its text, or time out.",
            object_schema(
                json!({
                    "selector": selector("CSS selector to wait for"),
                    "timeout": { "type": "integer", "description": "Maximum milliseconds to wait (default: 10000)" }
                }),
                &["selector"],
            ),
        ),
        descriptor(
            "browser_select",
            Browser,
            "Choose an option of a <select> element by value or by visible label.",
            object_schema(
                json!({
                    "selector": selector("CSS selector of the <select> element"),
                    "value": { "type": "string", "description": "Option value to select" },
                    "label": { "type": "string", "description": "Visible option text to select" }
                }),
                &["selector"],
            ),
        ),
        descriptor(
            "browser_get_elements",
            Browser,
            "Describe the elements matching a selector: tag, text, key attributes, visibility.",
            object_schema(
                json!({
                    "selector": selector("CSS selector to query"),
                    "limit": { "type": "integer", "description": "Maximum elements to return (default: 10)" }
                }),
                &["selector"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_catalog_names_are_unique() {
        let catalog = default_catalog();
        let names: BTreeSet<&str> = catalog.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_catalog_group_sizes() {
        let catalog = default_catalog();
        let count = |group| catalog.iter().filter(|tool| tool.group == group).count();
        assert_eq!(count(CapabilityGroup::Core), 3);
        assert_eq!(count(CapabilityGroup::Desktop), 13);
        assert_eq!(count(CapabilityGroup::Browser), 11);
    }

    #[test]
    fn test_only_run_command_is_gated() {
        let gated: Vec<String> = default_catalog()
            .into_iter()
            .filter(|tool| tool.gated)
            .map(|tool| tool.name)
            .collect();
        assert_eq!(gated, vec!["run_command".to_string()]);
    }

    #[test]
    fn test_every_schema_is_an_object_schema() {
        for tool in default_catalog() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(tool.input_schema["required"].is_array(), "{}", tool.name);
        }
    }
}
