use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::Result;
use log::info;

use crate::api::StoryApi;
use crate::flow::{Selection, StoryFlow};
use crate::settings::{SettingsService, SettingsStore};
use crate::story::node::{NodeId, StoryNode};
use crate::story::tree::Story;

// ---------------------------------------------------------------------------
// Outline tree
// ---------------------------------------------------------------------------

const PREVIEW_LEN: usize = 48;

/// First characters of a node's content, ellipsized.
fn preview(content: &str) -> String {
    let mut out: String = content.chars().take(PREVIEW_LEN).collect();
    if content.chars().count() > PREVIEW_LEN {
        out.push('…');
    }
    out
}

fn node_tag(node: &StoryNode) -> &'static str {
    if !node.is_ending {
        "·"
    } else if node.is_winning_ending {
        "★"
    } else {
        "†"
    }
}

/// Recursive projection of the story graph, root first, one line per node.
/// Only resolved option targets are expanded; the current node is marked.
fn render_outline(story: &Story, current: Option<NodeId>) {
    println!("--- {} ---", story.title);
    let mut visited = HashSet::new();
    render_subtree(story, story.root_id(), current, 0, &mut visited);
}

/// The visited set keeps the walk finite on non-tree input: a node reachable
/// through several branches renders once, and a cyclic graph cannot recurse
/// forever (same guarantee as the parent-map traversal).
fn render_subtree(
    story: &Story,
    id: NodeId,
    current: Option<NodeId>,
    depth: usize,
    visited: &mut HashSet<NodeId>,
) {
    if !visited.insert(id) {
        return;
    }
    let Some(node) = story.get(id) else { return };
    let marker = if current == Some(id) { ">" } else { " " };
    println!(
        "{marker} {:indent$}#{id} {} {}",
        "",
        node_tag(node),
        preview(&node.content),
        indent = depth * 2
    );
    if node.is_ending {
        return;
    }
    for opt in &node.options {
        if let Some(target) = opt.node_id {
            render_subtree(story, target, current, depth + 1, visited);
        }
    }
}

// ---------------------------------------------------------------------------
// Current node card
// ---------------------------------------------------------------------------

fn render_node_card(node: &StoryNode) {
    println!("\n{}\n", node.content);
    if node.is_ending {
        if node.is_winning_ending {
            println!("  *** A winning ending! ***");
        } else {
            println!("  *** The end. ***");
        }
    } else {
        for (i, opt) in node.options.iter().enumerate() {
            match opt.node_id {
                Some(_) => println!("  [{}] {}", i + 1, opt.text),
                None => println!("  [-] {} (unwritten branch)", opt.text),
            }
        }
    }
}

fn render<A>(flow: &StoryFlow<A>)
where
    A: StoryApi + Clone + Send + Sync + 'static,
{
    println!();
    match flow.story() {
        Some(story) => {
            render_outline(story, flow.current_node_id());
            match flow.current_node() {
                Some(node) => render_node_card(node),
                // choose() accepts unknown ids; keep the screen usable.
                None => {
                    if let Some(id) = flow.current_node_id() {
                        println!("\n(Node #{id} is missing from this story.)");
                    }
                }
            }
        }
        None => println!("No story loaded. Press [n] to generate one."),
    }
    if let Some(err) = flow.error() {
        println!("\n! {err}");
    }
}

// ---------------------------------------------------------------------------
// Input loop
// ---------------------------------------------------------------------------

fn show_help() {
    println!("  <number>  take that option");
    println!("  j <id>    jump to a node from the outline");
    println!("  p         read the story so far");
    println!("  n         generate a new story");
    println!("  r         reset");
    println!("  q         quit");
}

/// Prompt and read one trimmed line. `None` means stdin closed.
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

async fn generate<A>(flow: &mut StoryFlow<A>, theme: &str)
where
    A: StoryApi + Clone + Send + Sync + 'static,
{
    println!("\nGenerating a \"{theme}\" story...");
    flow.start(theme).await;
    if flow.error().is_none() {
        if let Some(story) = flow.story() {
            println!("\"{}\" is ready.", story.title);
            info!("backdrop image query: {}", flow.background_query(theme));
        }
    }
}

/// Resolve a 1-based option index on a node to its target id, with a
/// user-facing message when it cannot be followed.
fn option_target(node: &StoryNode, index: usize) -> Result<NodeId, String> {
    if node.is_ending {
        return Err("This is an ending. [n] for a new story, [r] to reset.".to_string());
    }
    let opt = index
        .checked_sub(1)
        .and_then(|i| node.options.get(i))
        .ok_or_else(|| format!("No option {index} here."))?;
    opt.node_id
        .ok_or_else(|| "That branch was never written.".to_string())
}

pub async fn run<A, S>(mut flow: StoryFlow<A>, mut settings: SettingsService<S>) -> Result<()>
where
    A: StoryApi + Clone + Send + Sync + 'static,
    S: SettingsStore,
{
    println!("========================================");
    println!("            S T O R Y F L O W");
    println!("========================================");
    show_help();

    let theme = settings.theme().to_string();
    generate(&mut flow, &theme).await;

    loop {
        render(&flow);
        let Some(input) = prompt("\n> ")? else { break };

        match input.as_str() {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "h" | "?" => show_help(),
            "r" => {
                flow.reset();
                println!("Reset.");
            }
            "p" => {
                let text = flow.narrative();
                if text.is_empty() {
                    println!("Nothing to read yet.");
                } else {
                    println!("\n--- The story so far ---\n\n{text}");
                }
            }
            "n" => {
                let label = format!("Theme [{}]: ", settings.theme());
                let Some(theme) = prompt(&label)? else { break };
                if !theme.is_empty() {
                    settings.set_theme(theme);
                }
                let theme = settings.theme().to_string();
                generate(&mut flow, &theme).await;
            }
            other => {
                if let Some(rest) = other.strip_prefix("j ") {
                    match rest.trim().parse::<NodeId>() {
                        Ok(id) => {
                            if flow.choose(id) == Selection::NotFound {
                                println!("No node #{id} in this story.");
                            }
                        }
                        Err(_) => println!("Usage: j <node id>"),
                    }
                } else if let Ok(index) = other.parse::<usize>() {
                    let target = match flow.current_node() {
                        Some(node) => option_target(node, index),
                        None => Err("No story here to continue.".to_string()),
                    };
                    match target {
                        Ok(target) => {
                            if flow.choose(target) == Selection::NotFound {
                                println!("That branch points at a missing node (#{target}).");
                            }
                        }
                        Err(msg) => println!("{msg}"),
                    }
                } else {
                    println!("Unrecognized input. [h] for help.");
                }
            }
        }
    }

    println!("\nThe end, for now.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::node::StoryOption;

    fn node(id: NodeId, content: &str, ending: bool, winning: bool) -> StoryNode {
        StoryNode {
            id,
            content: content.to_string(),
            is_ending: ending,
            is_winning_ending: winning,
            options: Vec::new(),
        }
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let short = "a short line";
        assert_eq!(preview(short), short);

        let long = "é".repeat(PREVIEW_LEN + 10);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_LEN + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn outline_terminates_on_cyclic_graphs() {
        // 1 -> 2 -> 1: a backend bug must not take the whole process down.
        let mut first = node(1, "first", false, false);
        first.options = vec![StoryOption {
            text: "onward".to_string(),
            node_id: Some(2),
        }];
        let mut second = node(2, "second", false, false);
        second.options = vec![StoryOption {
            text: "back".to_string(),
            node_id: Some(1),
        }];
        let story = Story {
            id: 1,
            title: "Loop".to_string(),
            root_node: first.clone(),
            all_nodes: [(1, first), (2, second)].into_iter().collect(),
        };

        render_outline(&story, Some(2));

        let mut visited = HashSet::new();
        render_subtree(&story, story.root_id(), None, 0, &mut visited);
        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn node_tags_distinguish_endings() {
        assert_eq!(node_tag(&node(1, "x", false, false)), "·");
        assert_eq!(node_tag(&node(2, "x", true, true)), "★");
        assert_eq!(node_tag(&node(3, "x", true, false)), "†");
    }

    #[test]
    fn option_target_follows_resolved_branches_only() {
        let mut fork = node(1, "fork", false, false);
        fork.options = vec![
            StoryOption {
                text: "onward".to_string(),
                node_id: Some(2),
            },
            StoryOption {
                text: "nowhere".to_string(),
                node_id: None,
            },
        ];

        assert_eq!(option_target(&fork, 1), Ok(2));
        assert!(option_target(&fork, 2).is_err());
        assert!(option_target(&fork, 0).is_err());
        assert!(option_target(&fork, 3).is_err());
    }

    #[test]
    fn option_target_rejects_endings() {
        let ending = node(4, "fin", true, true);
        assert!(option_target(&ending, 1).is_err());
    }
}
