//! AppCommand.xml request bodies and response checks
//!
//! The receiver's AppCommand endpoint takes a `<tx>` document holding `<cmd>` elements. It rejects
//! documents with more than five commands but accepts several root elements back to back, so long
//! command lists are split into chunks of five with the XML declaration written only once.

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{HttpError, Result};

/// Commands per `<tx>` element accepted by the receiver
pub const MAX_COMMANDS_PER_TX: usize = 5;

/// Attribute added to response `cmd` elements naming the command text that produced them
pub const CMD_TEXT_ATTRIBUTE: &str = "cmd_text";

/// Attribute added to response `cmd` elements naming the `<name>` sent with the command
pub const CMD_NAME_ATTRIBUTE: &str = "name";

/// A named parameter sent as `<param name="...">value</param>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParam {
    pub name: String,
    pub value: String,
}

impl CommandParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One `<cmd>` entry of an AppCommand request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCommand {
    pub cmd_id: String,
    pub cmd_text: Option<String>,
    pub name: Option<String>,
    pub params: Vec<CommandParam>,
    /// Value element written next to the `<cmd>`, e.g. `<bassvalue>6</bassvalue>`
    pub set_command: Option<CommandParam>,
}

impl AppCommand {
    /// Command with id `1` and the given text
    pub fn new(cmd_text: impl Into<String>) -> Self {
        Self {
            cmd_id: "1".to_string(),
            cmd_text: Some(cmd_text.into()),
            name: None,
            params: Vec::new(),
            set_command: None,
        }
    }

    /// Command with id `3`, identified by its `<name>` instead of a text
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            cmd_id: "3".to_string(),
            cmd_text: None,
            name: Some(name.into()),
            params: Vec::new(),
            set_command: None,
        }
    }

    pub fn with_param(mut self, param: CommandParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_set_command(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_command = Some(CommandParam::new(name, value));
        self
    }

    pub fn get_friendly_name() -> Self {
        Self::new("GetFriendlyName")
    }

    pub fn get_tone_control() -> Self {
        Self::new("GetToneControl")
    }

    /// `parameter` is one of `adjust`, `bassvalue`, `treblevalue`
    pub fn set_tone_control(parameter: &str, value: impl ToString) -> Self {
        Self::new("SetToneControl").with_set_command(parameter, value.to_string())
    }

    /// Sent to [`APPCOMMAND0300_URL`](crate::urls::APPCOMMAND0300_URL)
    pub fn get_audyssey() -> Self {
        ["dynamiceq", "reflevoffset", "dynamicvol", "multeq"]
            .into_iter()
            .fold(Self::named("GetAudyssey"), |command, param| {
                command.with_param(CommandParam::new(param, ""))
            })
    }

    /// `parameter` is one of `dynamiceq`, `multieq`, `reflevoffset`, `dynamicvol`
    pub fn set_audyssey(parameter: &str, value: impl ToString) -> Self {
        Self::named("SetAudyssey").with_param(CommandParam::new(parameter, value.to_string()))
    }

    fn to_element(&self) -> Element {
        let mut cmd = Element::new("cmd");
        cmd.attributes.insert("id".to_string(), self.cmd_id.clone());

        if let Some(text) = &self.cmd_text {
            cmd.children.push(XMLNode::Text(text.clone()));
        }

        if let Some(name) = &self.name {
            let mut name_element = Element::new("name");
            name_element.children.push(XMLNode::Text(name.clone()));
            cmd.children.push(XMLNode::Element(name_element));
        }

        if !self.params.is_empty() {
            let mut list = Element::new("list");
            for param in &self.params {
                let mut param_element = Element::new("param");
                param_element
                    .attributes
                    .insert("name".to_string(), param.name.clone());
                param_element.children.push(XMLNode::Text(param.value.clone()));
                list.children.push(XMLNode::Element(param_element));
            }
            cmd.children.push(XMLNode::Element(list));
        }

        cmd
    }
}

/// Build the POST body for a list of commands
pub fn build_body(commands: &[AppCommand]) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    for (index, chunk) in commands.chunks(MAX_COMMANDS_PER_TX).enumerate() {
        let mut tx = Element::new("tx");
        for command in chunk {
            tx.children.push(XMLNode::Element(command.to_element()));
            if let Some(set) = &command.set_command {
                let mut value = Element::new(&set.name);
                value.children.push(XMLNode::Text(set.value.clone()));
                tx.children.push(XMLNode::Element(value));
            }
        }

        let config = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(index == 0);
        tx.write_with_config(&mut body, config)
            .map_err(|e| HttpError::Parse(format!("Failed to write AppCommand body: {}", e)))?;
    }

    Ok(body)
}

/// Reject HTML error pages served with a 200 status
pub fn check_xml_validity(endpoint: &str, root: &Element) -> Result<()> {
    if root.name.eq_ignore_ascii_case("html") {
        return Err(HttpError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: "returned document contains HTML".to_string(),
        });
    }
    Ok(())
}

/// Match response `cmd` elements to the request and tag them with the command text and name
pub fn annotate_response(
    endpoint: &str,
    commands: &[AppCommand],
    mut root: Element,
) -> Result<Element> {
    let count = root
        .children
        .iter()
        .filter(|node| matches!(node, XMLNode::Element(_)))
        .count();
    if count != commands.len() {
        return Err(HttpError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: format!(
                "query has {} elements, response {}",
                commands.len(),
                count
            ),
        });
    }

    let children = root.children.iter_mut().filter_map(|node| match node {
        XMLNode::Element(element) => Some(element),
        _ => None,
    });
    for (child, command) in children.zip(commands) {
        if child.name != "cmd" && child.name != "error" {
            return Err(HttpError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: format!("unexpected tag <{}> in response", child.name),
            });
        }
        if let Some(text) = &command.cmd_text {
            child
                .attributes
                .insert(CMD_TEXT_ATTRIBUTE.to_string(), text.clone());
        }
        if let Some(name) = &command.name {
            child
                .attributes
                .insert(CMD_NAME_ATTRIBUTE.to_string(), name.clone());
        }
    }

    Ok(root)
}

/// Find the response element produced by the command with the given text
pub fn find_command<'a>(root: &'a Element, cmd_text: &str) -> Option<&'a Element> {
    find_tagged(root, CMD_TEXT_ATTRIBUTE, cmd_text)
}

/// Find the response element produced by the command sent with the given `<name>`
pub fn find_named_command<'a>(root: &'a Element, name: &str) -> Option<&'a Element> {
    find_tagged(root, CMD_NAME_ATTRIBUTE, name)
}

fn find_tagged<'a>(root: &'a Element, attribute: &str, value: &str) -> Option<&'a Element> {
    root.children.iter().find_map(|node| match node {
        XMLNode::Element(element)
            if element.attributes.get(attribute).map(String::as_str) == Some(value) =>
        {
            Some(element)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_string(commands: &[AppCommand]) -> String {
        String::from_utf8(build_body(commands).unwrap()).unwrap()
    }

    #[test]
    fn test_single_command_body() {
        let body = body_string(&[AppCommand::get_friendly_name()]);
        assert!(body.starts_with("<?xml"));
        assert!(body.contains(r#"<tx><cmd id="1">GetFriendlyName</cmd></tx>"#));
    }

    #[test]
    fn test_set_command_is_written_next_to_cmd() {
        let body = body_string(&[AppCommand::set_tone_control("bassvalue", 6)]);
        assert!(body.contains(r#"<cmd id="1">SetToneControl</cmd><bassvalue>6</bassvalue>"#));
    }

    #[test]
    fn test_named_command_with_params() {
        let body = body_string(&[AppCommand::set_audyssey("dynamiceq", 1)]);
        assert!(body.contains(r#"<cmd id="3"><name>SetAudyssey</name>"#));
        assert!(body.contains(r#"<list><param name="dynamiceq">1</param></list></cmd>"#));
    }

    #[test]
    fn test_get_audyssey_lists_every_setting() {
        let command = AppCommand::get_audyssey();
        assert_eq!(command.cmd_text, None);
        let names: Vec<&str> = command.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["dynamiceq", "reflevoffset", "dynamicvol", "multeq"]);
    }

    #[test]
    fn test_find_named_command() {
        let commands = [AppCommand::get_audyssey()];
        let root = Element::parse(
            r#"<rx><cmd><list><param name="dynamiceq">1</param></list></cmd></rx>"#.as_bytes(),
        )
        .unwrap();

        let root = annotate_response("/goform/AppCommand0300.xml", &commands, root).unwrap();

        assert!(find_named_command(&root, "GetAudyssey").is_some());
        assert!(find_command(&root, "GetAudyssey").is_none());
    }

    #[test]
    fn test_body_is_chunked_with_single_declaration() {
        let commands: Vec<AppCommand> =
            (0..7).map(|i| AppCommand::new(format!("Cmd{}", i))).collect();
        let body = body_string(&commands);

        assert_eq!(body.matches("<?xml").count(), 1);
        assert_eq!(body.matches("<tx>").count(), 2);
        assert_eq!(body.matches("<cmd ").count(), 7);

        let second_tx = body.rfind("<tx>").unwrap();
        assert!(body[second_tx..].contains("Cmd5"));
        assert!(!body[second_tx..].contains("Cmd4"));
    }

    #[test]
    fn test_check_xml_validity_rejects_html() {
        let html = Element::parse("<html><body>Error</body></html>".as_bytes()).unwrap();
        let result = check_xml_validity("/goform/AppCommand.xml", &html);
        assert!(matches!(result, Err(HttpError::InvalidResponse { .. })));

        let xml = Element::parse("<rx><cmd/></rx>".as_bytes()).unwrap();
        assert!(check_xml_validity("/goform/AppCommand.xml", &xml).is_ok());
    }

    #[test]
    fn test_annotate_response_tags_commands() {
        let commands = [AppCommand::get_friendly_name(), AppCommand::get_tone_control()];
        let root = Element::parse(
            concat!(
                "<rx><cmd><friendlyname>Living Room</friendlyname></cmd>",
                "<cmd><bassvalue>6</bassvalue></cmd></rx>"
            )
            .as_bytes(),
        )
        .unwrap();

        let root = annotate_response("/goform/AppCommand.xml", &commands, root).unwrap();

        let tone = find_command(&root, "GetToneControl").unwrap();
        assert_eq!(
            tone.get_child("bassvalue").and_then(|e| e.get_text()).as_deref(),
            Some("6")
        );
        assert!(find_command(&root, "GetFriendlyName").is_some());
    }

    #[test]
    fn test_annotate_response_length_mismatch() {
        let commands = [AppCommand::get_friendly_name(), AppCommand::get_tone_control()];
        let root = Element::parse("<rx><cmd/></rx>".as_bytes()).unwrap();

        let result = annotate_response("/goform/AppCommand.xml", &commands, root);
        assert!(matches!(result, Err(HttpError::InvalidResponse { .. })));
    }

    #[test]
    fn test_annotate_response_unexpected_tag() {
        let commands = [AppCommand::get_friendly_name()];
        let root = Element::parse("<rx><html/></rx>".as_bytes()).unwrap();

        let result = annotate_response("/goform/AppCommand.xml", &commands, root);
        assert!(matches!(result, Err(HttpError::InvalidResponse { .. })));
    }
}
