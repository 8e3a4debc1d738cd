//! Project a [`HeapGraph`] into a GEXF 1.3 graph document.
//!
//! GEXF is the XML exchange format read by Gephi and similar graph tools.
//! Every heap node becomes a `<node>` and every heap edge an `<edge>`, in
//! graph order. Node kind, self size, root membership and closure location
//! travel as attribute values.

use heap_graph::{HeapGraph, HeapNode};
use std::borrow::Cow;
use std::io::Write;
use tracing::debug;

use crate::error::Result;

const ATTR_KIND: u32 = 0;
const ATTR_SELF_SIZE: u32 = 1;
const ATTR_IS_ROOT: u32 = 2;
const ATTR_LOCATION: u32 = 3;

/// Escape text for use inside a double-quoted XML attribute.
///
/// Control characters XML 1.0 cannot carry at all are replaced with U+FFFD.
pub fn escape(text: &str) -> Cow<'_, str> {
    let needs_work = text
        .chars()
        .any(|c| matches!(c, '&' | '<' | '>' | '"' | '\'') || is_forbidden(c));
    if !needs_work {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_forbidden(c) => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn is_forbidden(c: char) -> bool {
    c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r')
}

fn write_node<W: Write>(writer: &mut W, node: &HeapNode) -> Result<()> {
    writeln!(
        writer,
        "      <node id=\"{}\" label=\"{}\">",
        node.id,
        escape(&node.name)
    )?;
    writeln!(writer, "        <attvalues>")?;
    writeln!(
        writer,
        "          <attvalue for=\"{}\" value=\"{}\"/>",
        ATTR_KIND, node.kind
    )?;
    writeln!(
        writer,
        "          <attvalue for=\"{}\" value=\"{}\"/>",
        ATTR_SELF_SIZE, node.self_size
    )?;
    writeln!(
        writer,
        "          <attvalue for=\"{}\" value=\"{}\"/>",
        ATTR_IS_ROOT, node.is_root
    )?;
    if let Some(location) = &node.location {
        writeln!(
            writer,
            "          <attvalue for=\"{}\" value=\"{}\"/>",
            ATTR_LOCATION,
            escape(&location.to_string())
        )?;
    }
    writeln!(writer, "        </attvalues>")?;
    writeln!(writer, "      </node>")?;
    Ok(())
}

/// Write a graph as a GEXF document.
pub fn write_gexf<W: Write>(graph: &HeapGraph, mut writer: W) -> Result<()> {
    writeln!(writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        writer,
        "<gexf xmlns=\"http://gexf.net/1.3\" version=\"1.3\">"
    )?;
    writeln!(writer, "  <meta>")?;
    writeln!(writer, "    <creator>memprof</creator>")?;
    writeln!(writer, "    <description>device heap snapshot</description>")?;
    writeln!(writer, "  </meta>")?;
    writeln!(
        writer,
        "  <graph defaultedgetype=\"directed\" mode=\"static\">"
    )?;

    writeln!(writer, "    <attributes class=\"node\">")?;
    for (id, title, kind) in [
        (ATTR_KIND, "kind", "string"),
        (ATTR_SELF_SIZE, "self_size", "long"),
        (ATTR_IS_ROOT, "is_root", "boolean"),
        (ATTR_LOCATION, "location", "string"),
    ] {
        writeln!(
            writer,
            "      <attribute id=\"{}\" title=\"{}\" type=\"{}\"/>",
            id, title, kind
        )?;
    }
    writeln!(writer, "    </attributes>")?;
    writeln!(writer, "    <attributes class=\"edge\">")?;
    writeln!(
        writer,
        "      <attribute id=\"{}\" title=\"kind\" type=\"string\"/>",
        ATTR_KIND
    )?;
    writeln!(writer, "    </attributes>")?;

    writeln!(writer, "    <nodes>")?;
    for node in graph.nodes() {
        write_node(&mut writer, node)?;
    }
    writeln!(writer, "    </nodes>")?;

    writeln!(writer, "    <edges>")?;
    for (idx, edge) in graph.edges().iter().enumerate() {
        writeln!(
            writer,
            "      <edge id=\"{}\" source=\"{}\" target=\"{}\" label=\"{}\">",
            idx,
            edge.from,
            edge.to,
            escape(&edge.label.to_string())
        )?;
        writeln!(
            writer,
            "        <attvalues><attvalue for=\"{}\" value=\"{}\"/></attvalues>",
            ATTR_KIND, edge.kind
        )?;
        writeln!(writer, "      </edge>")?;
    }
    writeln!(writer, "    </edges>")?;

    writeln!(writer, "  </graph>")?;
    writeln!(writer, "</gexf>")?;
    writer.flush()?;

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "wrote GEXF document"
    );
    Ok(())
}

/// Serialize a graph to GEXF bytes.
pub fn serialize_gexf(graph: &HeapGraph) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_gexf(graph, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_graph::{EdgeKind, EdgeLabel, HeapEdge, NodeKind, SourceLocation};

    fn render(graph: &HeapGraph) -> String {
        String::from_utf8(serialize_gexf(graph).unwrap()).unwrap()
    }

    fn sample_graph() -> HeapGraph {
        let mut closure = HeapNode::new(2, NodeKind::Closure, "handleClick", 40);
        closure.location = Some(SourceLocation {
            file: "src/app.js".to_string(),
            line: 5,
            column: 3,
        });
        HeapGraph::new(
            vec![
                HeapNode::new(0, NodeKind::Object, "Object", 32),
                HeapNode::new(1, NodeKind::String, "hello", 16),
                closure,
            ],
            vec![
                HeapEdge::new(0, 1, EdgeKind::Property, EdgeLabel::name("greeting")),
                HeapEdge::new(0, 2, EdgeKind::Property, EdgeLabel::name("onClick")),
            ],
            vec![0],
        )
        .unwrap()
    }

    #[test]
    fn one_element_per_node_and_edge() {
        let doc = render(&sample_graph());
        assert_eq!(doc.matches("<node ").count(), 3);
        assert_eq!(doc.matches("<edge ").count(), 2);
        assert!(doc.contains("defaultedgetype=\"directed\""));
        assert!(doc.contains("version=\"1.3\""));
    }

    #[test]
    fn node_attributes_are_written() {
        let doc = render(&sample_graph());
        assert!(doc.contains("<node id=\"0\" label=\"Object\">"));
        assert!(doc.contains("<attvalue for=\"2\" value=\"true\"/>"));
        assert!(doc.contains("<attvalue for=\"0\" value=\"closure\"/>"));
        assert!(doc.contains("<attvalue for=\"3\" value=\"src/app.js:5:3\"/>"));
        // Only the closure carries a location.
        assert_eq!(doc.matches("<attvalue for=\"3\"").count(), 1);
    }

    #[test]
    fn edges_carry_labels_and_kind() {
        let doc = render(&sample_graph());
        assert!(doc.contains("<edge id=\"1\" source=\"0\" target=\"2\" label=\"onClick\">"));
        assert!(doc.contains("<attvalue for=\"0\" value=\"property\"/>"));
    }

    #[test]
    fn element_labels_render_index() {
        let graph = HeapGraph::new(
            vec![
                HeapNode::new(0, NodeKind::Array, "Array", 16),
                HeapNode::new(1, NodeKind::Object, "Object", 16),
            ],
            vec![HeapEdge::new(0, 1, EdgeKind::Element, EdgeLabel::Index(4))],
            vec![],
        )
        .unwrap();
        let doc = render(&graph);
        assert!(doc.contains("label=\"4\""));
        assert!(doc.contains("value=\"element\""));
    }

    #[test]
    fn text_is_escaped() {
        let graph = HeapGraph::new(
            vec![HeapNode::new(0, NodeKind::String, "<a href=\"x\">&'", 8)],
            vec![],
            vec![],
        )
        .unwrap();
        let doc = render(&graph);
        assert!(doc.contains("label=\"&lt;a href=&quot;x&quot;&gt;&amp;&apos;\""));
    }

    #[test]
    fn escape_leaves_plain_text_borrowed() {
        assert!(matches!(escape("plain"), Cow::Borrowed("plain")));
        assert_eq!(escape("a\u{1}b"), "a\u{FFFD}b");
        assert_eq!(escape("tab\there"), "tab\there");
    }

    #[test]
    fn self_loop_is_one_edge() {
        let graph = HeapGraph::new(
            vec![HeapNode::new(0, NodeKind::Object, "Object", 8)],
            vec![HeapEdge::new(0, 0, EdgeKind::Property, EdgeLabel::name("me"))],
            vec![0],
        )
        .unwrap();
        let doc = render(&graph);
        assert_eq!(doc.matches("<edge ").count(), 1);
        assert!(doc.contains("source=\"0\" target=\"0\""));
    }

    #[test]
    fn serialization_is_idempotent() {
        let graph = sample_graph();
        assert_eq!(serialize_gexf(&graph).unwrap(), serialize_gexf(&graph).unwrap());
    }

    #[test]
    fn empty_graph_is_well_formed() {
        let graph = HeapGraph::new(vec![], vec![], vec![]).unwrap();
        let doc = render(&graph);
        assert_eq!(doc.matches("<node ").count(), 0);
        assert!(doc.trim_end().ends_with("</gexf>"));
    }
}
