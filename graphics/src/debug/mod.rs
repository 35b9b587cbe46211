//! Graph visualization and execution-plan logging.
//!
//! [`dump_graph`] writes two standalone HTML pages next to the given path:
//! `{stem}_mermaid.html` (rendered by Mermaid) and `{stem}_graphviz.html`
//! (DOT rendered by a WebAssembly GraphViz build). Both load their renderer
//! from a CDN.
//!
//! Passes are boxes, resources are rounded nodes. Culled passes are gray
//! and dashed, imported resources orange, transient resources green and
//! exported resources get a bold outline. Edges carry the requested state.
//! When the graph does not compile, the pages list the reasons.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compiler::{self, CompiledGraph};
use crate::graph::{PassHandle, RenderGraph, ResourceAccess, ResourceHandle, VirtualResource};
use crate::profile_scope;

const MERMAID_CDN: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";
const GRAPHVIZ_CDN: &str = "https://cdn.jsdelivr.net/npm/@hpcc-js/wasm@2/dist/graphviz.umd.js";

/// Paths written by [`dump_graph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFiles {
    /// Mermaid page.
    pub mermaid: PathBuf,
    /// GraphViz page.
    pub graphviz: PathBuf,
}

#[derive(Debug, Clone)]
struct Edge {
    pass: PassHandle,
    resource: ResourceHandle,
    write: bool,
    label: String,
}

/// Snapshot of what the dump shows.
struct GraphView<'a> {
    graph: &'a RenderGraph,
    culled: Vec<bool>,
    edges: Vec<Edge>,
    diagnostics: Vec<String>,
}

impl<'a> GraphView<'a> {
    fn new(graph: &'a RenderGraph) -> Self {
        let compiled = match graph.compiled() {
            Some(compiled) => Ok(compiled.clone()),
            None => compiler::compile(&graph.passes, &graph.resources),
        };
        match compiled {
            Ok(compiled) => Self::from_compiled(graph, &compiled),
            Err(error) => Self {
                graph,
                culled: vec![false; graph.passes.len()],
                edges: declared_edges(graph),
                diagnostics: vec![error.to_string()],
            },
        }
    }

    fn from_compiled(graph: &'a RenderGraph, compiled: &CompiledGraph) -> Self {
        let edges = compiled
            .passes()
            .iter()
            .flat_map(|pass| {
                pass.accesses().iter().flat_map(move |access| {
                    let label = access.requested.to_string();
                    let mut edges = Vec::with_capacity(2);
                    if access.access.is_read() {
                        edges.push(Edge {
                            pass: pass.handle(),
                            resource: access.resource,
                            write: false,
                            label: label.clone(),
                        });
                    }
                    if access.access.is_write() {
                        edges.push(Edge {
                            pass: pass.handle(),
                            resource: access.resource,
                            write: true,
                            label,
                        });
                    }
                    edges
                })
            })
            .collect();
        Self {
            graph,
            culled: compiled.passes().iter().map(|p| p.is_culled()).collect(),
            edges,
            diagnostics: Vec::new(),
        }
    }

    fn is_culled(&self, pass: PassHandle) -> bool {
        self.culled.get(pass.index()).copied().unwrap_or(false)
    }
}

/// Edges from raw declarations, used when the graph does not compile.
fn declared_edges(graph: &RenderGraph) -> Vec<Edge> {
    let mut edges = Vec::new();
    for pass in &graph.passes {
        for decl in &pass.declarations {
            let state = decl.read_state | decl.write_state;
            let label = if state.is_empty() {
                "default".to_string()
            } else {
                state.to_string()
            };
            if decl.access.is_read() {
                edges.push(Edge {
                    pass: pass.handle,
                    resource: decl.resource,
                    write: false,
                    label: label.clone(),
                });
            }
            if decl.access.is_write() {
                edges.push(Edge {
                    pass: pass.handle,
                    resource: decl.resource,
                    write: true,
                    label,
                });
            }
        }
        for binding in &pass.render_targets {
            edges.push(Edge {
                pass: pass.handle,
                resource: binding.texture.handle(),
                write: true,
                label: "RenderTarget".to_string(),
            });
        }
        if let Some(binding) = &pass.depth_stencil {
            edges.push(Edge {
                pass: pass.handle,
                resource: binding.texture.handle(),
                write: !binding.read_only,
                label: if binding.read_only { "DepthRead" } else { "DepthWrite" }.to_string(),
            });
        }
    }
    edges
}

fn resource_class(resource: &VirtualResource) -> &'static str {
    if resource.is_imported() {
        "imported"
    } else {
        "transient"
    }
}

fn mermaid_text(text: &str) -> String {
    text.replace('"', "#quot;").replace('|', "#124;")
}

fn dot_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn html_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn mermaid_source(view: &GraphView<'_>) -> String {
    let graph = view.graph;
    let mut out = String::from("flowchart LR\n");

    for pass in &graph.passes {
        let _ = writeln!(out, "    {}[\"{}\"]", pass.handle, mermaid_text(&pass.name));
    }
    for resource in &graph.resources {
        let _ = writeln!(out, "    {}([\"{}\"])", resource.handle, mermaid_text(&resource.name));
    }
    for edge in &view.edges {
        let (from, to) = if edge.write {
            (edge.pass.to_string(), edge.resource.to_string())
        } else {
            (edge.resource.to_string(), edge.pass.to_string())
        };
        let _ = writeln!(out, "    {from} -->|\"{}\"| {to}", mermaid_text(&edge.label));
    }
    for pass in &graph.passes {
        for dependency in &pass.dependencies {
            let _ = writeln!(out, "    {dependency} -.-> {}", pass.handle);
        }
    }

    out.push_str("    classDef culled fill:#e0e0e0,stroke:#9e9e9e,color:#757575,stroke-dasharray:5 5\n");
    out.push_str("    classDef imported fill:#fdb863,stroke:#b35806\n");
    out.push_str("    classDef transient fill:#b8e186,stroke:#4d9221\n");
    out.push_str("    classDef exported stroke-width:4px\n");
    for pass in graph.passes.iter().filter(|p| view.is_culled(p.handle)) {
        let _ = writeln!(out, "    class {} culled", pass.handle);
    }
    for resource in &graph.resources {
        let _ = writeln!(out, "    class {} {}", resource.handle, resource_class(resource));
        if resource.is_exported() {
            let _ = writeln!(out, "    class {} exported", resource.handle);
        }
    }
    out
}

fn dot_source(view: &GraphView<'_>) -> String {
    let graph = view.graph;
    let mut out = String::from("digraph render_graph {\n    rankdir=LR;\n    node [fontname=\"Helvetica\"];\n");

    for pass in &graph.passes {
        let style = if view.is_culled(pass.handle) {
            "style=\"filled,dashed\", fillcolor=\"#e0e0e0\", color=\"#9e9e9e\", fontcolor=\"#757575\""
        } else {
            "style=filled, fillcolor=\"#92c5de\""
        };
        let _ = writeln!(
            out,
            "    {} [shape=box, label=\"{}\", {}];",
            pass.handle,
            dot_text(&pass.name),
            style
        );
    }
    for resource in &graph.resources {
        let fill = if resource.is_imported() { "#fdb863" } else { "#b8e186" };
        let width = if resource.is_exported() { 3 } else { 1 };
        let _ = writeln!(
            out,
            "    {} [shape=box, style=\"rounded,filled\", fillcolor=\"{}\", penwidth={}, label=\"{}\\n{}\"];",
            resource.handle,
            fill,
            width,
            dot_text(&resource.name),
            dot_text(&resource.descriptor.summary())
        );
    }
    for edge in &view.edges {
        let (from, to) = if edge.write {
            (edge.pass.to_string(), edge.resource.to_string())
        } else {
            (edge.resource.to_string(), edge.pass.to_string())
        };
        let _ = writeln!(out, "    {from} -> {to} [label=\"{}\"];", dot_text(&edge.label));
    }
    for pass in &graph.passes {
        for dependency in &pass.dependencies {
            let _ = writeln!(out, "    {dependency} -> {} [style=dotted];", pass.handle);
        }
    }
    out.push_str("}\n");
    out
}

fn diagnostics_html(view: &GraphView<'_>) -> String {
    if view.diagnostics.is_empty() {
        return String::new();
    }
    let mut out = String::from("<section class=\"diagnostics\">\n<h2>Compile errors</h2>\n<ul>\n");
    for message in &view.diagnostics {
        let _ = writeln!(out, "<li>{}</li>", html_text(message));
    }
    out.push_str("</ul>\n</section>\n");
    out
}

fn page(title: &str, body: &str, view: &GraphView<'_>) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>body {{ font-family: sans-serif; }} .diagnostics {{ color: #b2182b; }}</style>\n\
         </head>\n<body>\n<h1>{title}</h1>\n{diagnostics}{body}</body>\n</html>\n",
        title = html_text(title),
        diagnostics = diagnostics_html(view),
    )
}

/// Mermaid flowchart source of the graph.
pub fn to_mermaid(graph: &RenderGraph) -> String {
    mermaid_source(&GraphView::new(graph))
}

/// GraphViz DOT source of the graph.
pub fn to_dot(graph: &RenderGraph) -> String {
    dot_source(&GraphView::new(graph))
}

/// Write the Mermaid and GraphViz pages for `graph` next to `path`.
pub fn dump_graph(graph: &RenderGraph, path: &Path) -> std::io::Result<DumpFiles> {
    profile_scope!("dump_graph");

    let view = GraphView::new(graph);
    let stem = path
        .file_stem()
        .map_or_else(|| "render_graph".to_string(), |s| s.to_string_lossy().into_owned());
    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    if !directory.as_os_str().is_empty() {
        fs::create_dir_all(directory)?;
    }

    let files = DumpFiles {
        mermaid: directory.join(format!("{stem}_mermaid.html")),
        graphviz: directory.join(format!("{stem}_graphviz.html")),
    };

    let mermaid_body = format!(
        "<pre class=\"mermaid\">\n{}</pre>\n<script src=\"{MERMAID_CDN}\"></script>\n\
         <script>mermaid.initialize({{ startOnLoad: true, maxTextSize: 1000000 }});</script>\n",
        html_text(&mermaid_source(&view))
    );
    fs::write(&files.mermaid, page(&stem, &mermaid_body, &view))?;

    let graphviz_body = format!(
        "<div id=\"graph\"></div>\n<script id=\"dot\" type=\"text/plain\">\n{}</script>\n\
         <script src=\"{GRAPHVIZ_CDN}\"></script>\n\
         <script>\nconst dot = document.getElementById(\"dot\").textContent;\n\
         window[\"@hpcc-js/wasm\"].Graphviz.load().then(graphviz => {{\n\
         document.getElementById(\"graph\").innerHTML = graphviz.layout(dot, \"svg\", \"dot\");\n\
         }});\n</script>\n",
        dot_source(&view).replace("</script", "<\\/script")
    );
    fs::write(&files.graphviz, page(&stem, &graphviz_body, &view))?;

    log::debug!(
        "Dumped render graph to {} and {}",
        files.mermaid.display(),
        files.graphviz.display()
    );
    Ok(files)
}

/// Log the compiled schedule, culled passes and resource lifetimes.
pub fn log_execution_plan(graph: &RenderGraph) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let Some(compiled) = graph.compiled() else {
        log::debug!("Execution plan: graph is not compiled");
        return;
    };

    let name_of = |resource: &ResourceHandle| {
        graph
            .resources
            .get(resource.index())
            .map_or("?", |r| r.name.as_str())
    };

    log::debug!(
        "Execution plan: {} passes scheduled, {} culled",
        compiled.pass_count(),
        compiled.passes().len() - compiled.pass_count()
    );
    for (position, handle) in compiled.schedule().iter().enumerate() {
        let Some(pass) = graph.pass(*handle) else {
            continue;
        };
        let accesses: Vec<String> = compiled
            .pass(*handle)
            .map(|p| {
                p.accesses()
                    .iter()
                    .map(|a| {
                        let kind = match a.access {
                            ResourceAccess::Read => "R",
                            ResourceAccess::Write => "W",
                            ResourceAccess::ReadWrite => "RW",
                        };
                        format!("{}:{}:{}", name_of(&a.resource), kind, a.planned)
                    })
                    .collect()
            })
            .unwrap_or_default();
        log::debug!("  {:>3} {} [{}]", position, pass.name, accesses.join(", "));
    }
    for handle in compiled.culled_passes() {
        if let Some(pass) = graph.pass(handle) {
            log::debug!("  culled: {}", pass.name);
        }
    }
    for resource in &graph.resources {
        if let Some(lifetime) = resource.lifetime {
            log::debug!(
                "  {} {}: {}..{}",
                resource_class(resource),
                resource.name,
                lifetime.first,
                lifetime.last
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuResourceHandle;
    use crate::graph::{LoadOp, PassFlags};
    use crate::types::{ResourceState, TextureDescriptor, TextureFormat, TextureUsage};

    fn sample_graph() -> RenderGraph {
        let mut graph = RenderGraph::new();
        let desc = TextureDescriptor::new_2d(
            32,
            32,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
        );
        let scene = graph.create_texture("scene \"hdr\"", desc).unwrap();
        let unused = graph.create_texture("unused", desc).unwrap();
        let backbuffer = graph
            .import_texture("backbuffer", GpuResourceHandle(1), desc, ResourceState::PRESENT)
            .unwrap();
        graph
            .add_pass("scene", PassFlags::RASTER)
            .render_target(scene, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0))
            .finish();
        graph
            .add_pass("dead", PassFlags::RASTER)
            .render_target(unused, LoadOp::DontCare)
            .finish();
        graph
            .add_pass("present", PassFlags::RASTER)
            .read(scene)
            .render_target(backbuffer, LoadOp::DontCare)
            .finish();
        graph.export(backbuffer, ResourceState::PRESENT).unwrap();
        graph
    }

    #[test]
    fn test_mermaid_marks_culled_and_kinds() {
        let graph = sample_graph();
        let text = to_mermaid(&graph);
        assert!(text.starts_with("flowchart LR"));
        assert!(text.contains("class p1 culled"));
        assert!(!text.contains("class p0 culled"));
        assert!(text.contains("class r2 imported"));
        assert!(text.contains("class r2 exported"));
        assert!(text.contains("class r0 transient"));
        assert!(text.contains("#quot;hdr#quot;"));
        assert!(text.contains("r0 -->|\"NonPixelShaderResource#124;PixelShaderResource\"| p2"));
    }

    #[test]
    fn test_dot_labels_edges_with_states() {
        let graph = sample_graph();
        let text = to_dot(&graph);
        assert!(text.starts_with("digraph render_graph"));
        assert!(text.contains("p0 -> r0 [label=\"RenderTarget\"]"));
        assert!(text.contains("dashed"));
        assert!(text.contains("scene \\\"hdr\\\""));
    }

    #[test]
    fn test_dump_writes_both_pages() {
        let graph = sample_graph();
        let dir = std::env::temp_dir().join(format!("redlilium_dump_{}", std::process::id()));
        let files = dump_graph(&graph, &dir.join("frame.html")).unwrap();
        assert_eq!(files.mermaid, dir.join("frame_mermaid.html"));
        assert_eq!(files.graphviz, dir.join("frame_graphviz.html"));
        let mermaid = fs::read_to_string(&files.mermaid).unwrap();
        let graphviz = fs::read_to_string(&files.graphviz).unwrap();
        assert!(mermaid.contains("mermaid.initialize"));
        assert!(graphviz.contains("digraph render_graph"));
        assert!(!mermaid.contains("Compile errors"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dump_lists_compile_errors() {
        let mut graph = RenderGraph::new();
        let desc = TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        let history = graph.create_texture("history", desc).unwrap();
        graph.export(history, ResourceState::ALL_SHADER_RESOURCE).unwrap();

        let dir = std::env::temp_dir().join(format!("redlilium_dump_err_{}", std::process::id()));
        let files = dump_graph(&graph, &dir.join("broken")).unwrap();
        let page = fs::read_to_string(&files.mermaid).unwrap();
        assert!(page.contains("Compile errors"));
        assert!(page.contains("history"));
        let _ = fs::remove_dir_all(&dir);
    }
}
