//! BPMN 2.0 subset import and export
//!
//! The interchange covers exactly the elements the engine executes:
//! `startEvent`, `userTask`, `exclusiveGateway`, `parallelGateway`,
//! `endEvent`, and `sequenceFlow` with an optional `conditionExpression`
//! child. Parallel gateways are disambiguated by fan-in: more than one
//! incoming flow makes a join, otherwise a split.
//!
//! The parser is a small hand-written scanner over that fixed vocabulary,
//! not a general XML reader. Unknown elements are rejected rather than
//! skipped so a lossy import can never masquerade as a successful one.

use std::collections::HashMap;

use crate::domain::definition::ProcessDefinition;
use crate::domain::graph::{AssigneeRule, Edge, EdgeId, Node, NodeId, NodeKind, ProcessGraph};
use crate::error::EngineError;

const BPMN_NS: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";

/// The outcome of parsing a BPMN document
#[derive(Debug, Clone, PartialEq)]
pub struct BpmnProcess {
    /// The `process` element's id, used as the definition name
    pub id: String,
    /// The `process` element's name attribute, if present
    pub name: Option<String>,
    /// The executable graph
    pub graph: ProcessGraph,
}

/// Render a definition's graph as a BPMN document
pub fn render(definition: &ProcessDefinition) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<definitions xmlns=\"{}\" id=\"{}\">\n",
        BPMN_NS,
        escape(&definition.id.0)
    ));
    out.push_str(&format!(
        "  <process id=\"{}\" name=\"{}\" isExecutable=\"true\">\n",
        escape(&definition.name),
        escape(definition.description.as_deref().unwrap_or(&definition.name)),
    ));

    for node in &definition.graph.nodes {
        out.push_str("    ");
        out.push_str(&render_node(node));
        out.push('\n');
    }
    for edge in &definition.graph.edges {
        out.push_str("    ");
        out.push_str(&render_edge(edge));
        out.push('\n');
    }

    out.push_str("  </process>\n");
    out.push_str("</definitions>\n");
    out
}

fn render_node(node: &Node) -> String {
    let id = escape(&node.id.0);
    let name = escape(&node.name);
    match &node.kind {
        NodeKind::Start => format!("<startEvent id=\"{}\" name=\"{}\"/>", id, name),
        NodeKind::End => format!("<endEvent id=\"{}\" name=\"{}\"/>", id, name),
        NodeKind::Decision => format!("<exclusiveGateway id=\"{}\" name=\"{}\"/>", id, name),
        NodeKind::ParallelSplit | NodeKind::ParallelJoin => {
            format!("<parallelGateway id=\"{}\" name=\"{}\"/>", id, name)
        }
        NodeKind::Task {
            assignee,
            priority,
            due_in_minutes,
        } => {
            let mut attrs = format!("<userTask id=\"{}\" name=\"{}\"", id, name);
            match assignee {
                AssigneeRule::User(user) => {
                    attrs.push_str(&format!(" assignee=\"{}\"", escape(user)))
                }
                AssigneeRule::Group(group) => {
                    attrs.push_str(&format!(" candidateGroups=\"{}\"", escape(group)))
                }
            }
            if *priority != 0 {
                attrs.push_str(&format!(" priority=\"{}\"", priority));
            }
            if let Some(minutes) = due_in_minutes {
                attrs.push_str(&format!(" dueInMinutes=\"{}\"", minutes));
            }
            attrs.push_str("/>");
            attrs
        }
    }
}

fn render_edge(edge: &Edge) -> String {
    let open = format!(
        "<sequenceFlow id=\"{}\" sourceRef=\"{}\" targetRef=\"{}\"",
        escape(&edge.id.0),
        escape(&edge.from.0),
        escape(&edge.to.0)
    );
    match &edge.guard {
        None => format!("{}/>", open),
        Some(guard) => format!(
            "{}><conditionExpression>{}</conditionExpression></sequenceFlow>",
            open,
            escape(guard)
        ),
    }
}

/// Parse a BPMN document into a process graph
pub fn parse(xml: &str) -> Result<BpmnProcess, EngineError> {
    let elements = scan(xml)?;

    let process = elements
        .iter()
        .find(|e| e.name == "process")
        .ok_or_else(|| EngineError::Bpmn("Document has no process element".to_string()))?;
    let process_id = process
        .attr("id")
        .ok_or_else(|| EngineError::Bpmn("Process element has no id".to_string()))?
        .to_string();
    let process_name = process.attr("name").map(|s| s.to_string());

    let mut nodes = Vec::new();
    let mut flows: Vec<(Element, Option<String>)> = Vec::new();
    let mut parallel_gateways = Vec::new();

    for element in &elements {
        match element.name.as_str() {
            "definitions" | "process" | "conditionExpression" => {}
            "startEvent" => nodes.push(plain_node(element, NodeKind::Start)?),
            "endEvent" => nodes.push(plain_node(element, NodeKind::End)?),
            "exclusiveGateway" => nodes.push(plain_node(element, NodeKind::Decision)?),
            "parallelGateway" => parallel_gateways.push(element.clone()),
            "userTask" => nodes.push(user_task(element)?),
            "sequenceFlow" => flows.push((element.clone(), element.text.clone())),
            other => {
                return Err(EngineError::Bpmn(format!(
                    "Unsupported element: {}",
                    other
                )))
            }
        }
    }

    let mut edges = Vec::new();
    let mut fan_in: HashMap<String, usize> = HashMap::new();
    for (flow, condition) in &flows {
        let id = required_attr(flow, "id")?;
        let source = required_attr(flow, "sourceRef")?;
        let target = required_attr(flow, "targetRef")?;
        *fan_in.entry(target.to_string()).or_insert(0) += 1;
        edges.push(Edge {
            id: EdgeId(id.to_string()),
            from: NodeId(source.to_string()),
            to: NodeId(target.to_string()),
            guard: condition.clone(),
        });
    }

    for gateway in &parallel_gateways {
        let id = required_attr(gateway, "id")?;
        let kind = if fan_in.get(id).copied().unwrap_or(0) > 1 {
            NodeKind::ParallelJoin
        } else {
            NodeKind::ParallelSplit
        };
        nodes.push(plain_node(gateway, kind)?);
    }

    Ok(BpmnProcess {
        id: process_id,
        name: process_name,
        graph: ProcessGraph { nodes, edges },
    })
}

fn plain_node(element: &Element, kind: NodeKind) -> Result<Node, EngineError> {
    let id = required_attr(element, "id")?;
    Ok(Node {
        id: NodeId(id.to_string()),
        name: element.attr("name").unwrap_or(id).to_string(),
        kind,
    })
}

fn user_task(element: &Element) -> Result<Node, EngineError> {
    let id = required_attr(element, "id")?;
    let assignee = match (element.attr("assignee"), element.attr("candidateGroups")) {
        (Some(user), None) => AssigneeRule::User(user.to_string()),
        (None, Some(group)) => AssigneeRule::Group(group.to_string()),
        (None, None) => {
            return Err(EngineError::Bpmn(format!(
                "userTask {} needs assignee or candidateGroups",
                id
            )))
        }
        (Some(_), Some(_)) => {
            return Err(EngineError::Bpmn(format!(
                "userTask {} has both assignee and candidateGroups",
                id
            )))
        }
    };

    let priority = match element.attr("priority") {
        None => 0,
        Some(raw) => raw.parse::<i32>().map_err(|_| {
            EngineError::Bpmn(format!("userTask {} has invalid priority '{}'", id, raw))
        })?,
    };
    let due_in_minutes = match element.attr("dueInMinutes") {
        None => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            EngineError::Bpmn(format!("userTask {} has invalid dueInMinutes '{}'", id, raw))
        })?),
    };

    Ok(Node {
        id: NodeId(id.to_string()),
        name: element.attr("name").unwrap_or(id).to_string(),
        kind: NodeKind::Task {
            assignee,
            priority,
            due_in_minutes,
        },
    })
}

fn required_attr<'a>(element: &'a Element, name: &str) -> Result<&'a str, EngineError> {
    element.attr(name).ok_or_else(|| {
        EngineError::Bpmn(format!(
            "Element {} is missing required attribute {}",
            element.name, name
        ))
    })
}

/// One scanned element, with nested text already attached
#[derive(Debug, Clone)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    /// Text of a nested conditionExpression, for sequence flows
    text: Option<String>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Scan the document into a flat element list
///
/// Namespace prefixes are stripped; `bpmn:userTask` and `userTask` are the
/// same element. Condition text is folded into its parent sequence flow.
fn scan(xml: &str) -> Result<Vec<Element>, EngineError> {
    let mut elements: Vec<Element> = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];

        // prolog and comments
        if rest.starts_with('?') {
            let end = rest
                .find("?>")
                .ok_or_else(|| EngineError::Bpmn("Unterminated XML prolog".to_string()))?;
            rest = &rest[end + 2..];
            continue;
        }
        if rest.starts_with("!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| EngineError::Bpmn("Unterminated comment".to_string()))?;
            rest = &rest[end + 3..];
            continue;
        }

        let close = rest
            .find('>')
            .ok_or_else(|| EngineError::Bpmn("Unterminated tag".to_string()))?;
        let tag = &rest[..close];
        rest = &rest[close + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            // closing tag; nothing to record
            let _ = local_name(name.trim());
            continue;
        }

        let self_closing = tag.ends_with('/');
        let body = if self_closing { &tag[..tag.len() - 1] } else { tag };
        let (raw_name, attrs) = split_tag(body)?;
        let name = local_name(&raw_name);

        if name == "conditionExpression" {
            let end = rest.find('<').ok_or_else(|| {
                EngineError::Bpmn("Unterminated conditionExpression".to_string())
            })?;
            let text = unescape(rest[..end].trim());
            match elements.last_mut() {
                Some(parent) if parent.name == "sequenceFlow" => parent.text = Some(text),
                _ => {
                    return Err(EngineError::Bpmn(
                        "conditionExpression outside a sequenceFlow".to_string(),
                    ))
                }
            }
            continue;
        }

        elements.push(Element {
            name,
            attributes: attrs,
            text: None,
        });
    }

    if elements.is_empty() {
        return Err(EngineError::Bpmn("Document has no elements".to_string()));
    }
    Ok(elements)
}

fn local_name(name: &str) -> String {
    match name.rfind(':') {
        Some(i) => name[i + 1..].to_string(),
        None => name.to_string(),
    }
}

/// Split a tag body into its name and attribute pairs
fn split_tag(body: &str) -> Result<(String, Vec<(String, String)>), EngineError> {
    let body = body.trim();
    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_string();
    if name.is_empty() {
        return Err(EngineError::Bpmn("Tag with empty name".to_string()));
    }

    let mut attrs = Vec::new();
    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| EngineError::Bpmn(format!("Malformed attribute in <{}>", name)))?;
        let key = local_name(rest[..eq].trim());
        rest = rest[eq + 1..].trim_start();
        if !rest.starts_with('"') {
            return Err(EngineError::Bpmn(format!(
                "Attribute {} in <{}> is not quoted",
                key, name
            )));
        }
        rest = &rest[1..];
        let end = rest
            .find('"')
            .ok_or_else(|| EngineError::Bpmn(format!("Unterminated attribute in <{}>", name)))?;
        attrs.push((key, unescape(&rest[..end])));
        rest = rest[end + 1..].trim_start();
    }

    Ok((name, attrs))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::ProcessDefinition;

    const TRIAGE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" id="defs">
  <process id="triage" name="Patient Triage" isExecutable="true">
    <startEvent id="start" name="Arrival"/>
    <exclusiveGateway id="check" name="Severity?"/>
    <userTask id="urgent" name="Urgent care" candidateGroups="doctors" priority="5"/>
    <userTask id="routine" name="Routine care" assignee="nurse-on-duty" dueInMinutes="120"/>
    <endEvent id="end" name="Done"/>
    <sequenceFlow id="f1" sourceRef="start" targetRef="check"/>
    <sequenceFlow id="f2" sourceRef="check" targetRef="urgent">
      <conditionExpression>severity == 'high'</conditionExpression>
    </sequenceFlow>
    <sequenceFlow id="f3" sourceRef="check" targetRef="routine"/>
    <sequenceFlow id="f4" sourceRef="urgent" targetRef="end"/>
    <sequenceFlow id="f5" sourceRef="routine" targetRef="end"/>
  </process>
</definitions>"#;

    #[test]
    fn test_parse_triage_document() {
        let process = parse(TRIAGE_XML).unwrap();
        assert_eq!(process.id, "triage");
        assert_eq!(process.name.as_deref(), Some("Patient Triage"));
        assert_eq!(process.graph.nodes.len(), 5);
        assert_eq!(process.graph.edges.len(), 5);

        let urgent = process.graph.node(&NodeId("urgent".to_string())).unwrap();
        match &urgent.kind {
            NodeKind::Task {
                assignee, priority, ..
            } => {
                assert_eq!(assignee, &AssigneeRule::Group("doctors".to_string()));
                assert_eq!(*priority, 5);
            }
            other => panic!("expected task, got {:?}", other),
        }

        let routine = process.graph.node(&NodeId("routine".to_string())).unwrap();
        match &routine.kind {
            NodeKind::Task {
                assignee,
                due_in_minutes,
                ..
            } => {
                assert_eq!(assignee, &AssigneeRule::User("nurse-on-duty".to_string()));
                assert_eq!(*due_in_minutes, Some(120));
            }
            other => panic!("expected task, got {:?}", other),
        }

        let guarded = process.graph.edge(&EdgeId("f2".to_string())).unwrap();
        assert_eq!(guarded.guard.as_deref(), Some("severity == 'high'"));

        assert!(process.graph.validate().is_empty());
    }

    #[test]
    fn test_parallel_gateway_disambiguation() {
        let xml = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" id="d">
  <process id="p">
    <startEvent id="start"/>
    <parallelGateway id="fork"/>
    <userTask id="a" candidateGroups="g"/>
    <userTask id="b" candidateGroups="g"/>
    <parallelGateway id="merge"/>
    <endEvent id="end"/>
    <sequenceFlow id="f1" sourceRef="start" targetRef="fork"/>
    <sequenceFlow id="f2" sourceRef="fork" targetRef="a"/>
    <sequenceFlow id="f3" sourceRef="fork" targetRef="b"/>
    <sequenceFlow id="f4" sourceRef="a" targetRef="merge"/>
    <sequenceFlow id="f5" sourceRef="b" targetRef="merge"/>
    <sequenceFlow id="f6" sourceRef="merge" targetRef="end"/>
  </process>
</definitions>"#;

        let process = parse(xml).unwrap();
        let fork = process.graph.node(&NodeId("fork".to_string())).unwrap();
        let merge = process.graph.node(&NodeId("merge".to_string())).unwrap();
        assert_eq!(fork.kind, NodeKind::ParallelSplit);
        assert_eq!(merge.kind, NodeKind::ParallelJoin);
    }

    #[test]
    fn test_namespace_prefixes_are_stripped() {
        let xml = r#"<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" id="d">
  <bpmn:process id="p">
    <bpmn:startEvent id="start"/>
    <bpmn:userTask id="t" candidateGroups="g"/>
    <bpmn:endEvent id="end"/>
    <bpmn:sequenceFlow id="f1" sourceRef="start" targetRef="t"/>
    <bpmn:sequenceFlow id="f2" sourceRef="t" targetRef="end"/>
  </bpmn:process>
</bpmn:definitions>"#;

        let process = parse(xml).unwrap();
        assert_eq!(process.graph.nodes.len(), 3);
    }

    #[test]
    fn test_unsupported_element_is_rejected() {
        let xml = r#"<definitions id="d"><process id="p">
  <startEvent id="s"/>
  <scriptTask id="hack"/>
</process></definitions>"#;

        let err = parse(xml).unwrap_err();
        assert!(matches!(err, EngineError::Bpmn(_)));
        assert!(err.to_string().contains("scriptTask"));
    }

    #[test]
    fn test_user_task_needs_an_assignment() {
        let xml = r#"<definitions id="d"><process id="p">
  <userTask id="t" name="No owner"/>
</process></definitions>"#;

        let err = parse(xml).unwrap_err();
        assert!(matches!(err, EngineError::Bpmn(_)));
    }

    #[test]
    fn test_round_trip_preserves_graph() {
        let original = parse(TRIAGE_XML).unwrap();
        let definition = ProcessDefinition::new(
            original.id.clone(),
            1,
            original.name.clone(),
            original.graph.clone(),
        );

        let rendered = render(&definition);
        let back = parse(&rendered).unwrap();

        assert_eq!(back.id, original.id);
        assert_eq!(back.graph.edges, original.graph.edges);
        let mut original_nodes = original.graph.nodes.clone();
        let mut back_nodes = back.graph.nodes.clone();
        original_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        back_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(back_nodes, original_nodes);
    }

    #[test]
    fn test_escaped_guard_round_trip() {
        let graph = ProcessGraph {
            nodes: vec![
                Node {
                    id: NodeId("start".to_string()),
                    name: "Start".to_string(),
                    kind: NodeKind::Start,
                },
                Node {
                    id: NodeId("end".to_string()),
                    name: "End".to_string(),
                    kind: NodeKind::End,
                },
            ],
            edges: vec![Edge {
                id: EdgeId("f1".to_string()),
                from: NodeId("start".to_string()),
                to: NodeId("end".to_string()),
                guard: Some("a < 3 && b > \"x\"".to_string()),
            }],
        };
        let definition = ProcessDefinition::new("esc".to_string(), 1, None, graph.clone());

        let rendered = render(&definition);
        let back = parse(&rendered).unwrap();
        assert_eq!(back.graph.edges[0].guard, graph.edges[0].guard);
    }
}
