// ABOUTME: Keeps one render target per function of a job in step with its snapshots
// ABOUTME: Re-renders a function only when its diagram description changes

use std::collections::HashMap;

use super::renderer::{DiagramRenderer, DiagramTarget, RenderOutput, RenderTicket};
use crate::remote::{FunctionResult, Job};

struct Card {
    target: DiagramTarget,
    description: String,
    validated: bool,
}

/// A function's diagram as currently shown.
#[derive(Debug, Clone)]
pub struct CardView {
    pub name: String,
    /// The Mermaid source the diagram was drawn from.
    pub description: String,
    pub validated: bool,
    pub output: Option<RenderOutput>,
}

pub struct DiagramBoard {
    renderer: DiagramRenderer,
    order: Vec<String>,
    cards: HashMap<String, Card>,
}

impl DiagramBoard {
    pub fn new(renderer: DiagramRenderer) -> Self {
        Self {
            renderer,
            order: Vec::new(),
            cards: HashMap::new(),
        }
    }

    /// Applies a new job snapshot. Returns tickets for the renders it started.
    pub fn reconcile(&mut self, job: &Job) -> Vec<RenderTicket> {
        let mut tickets = Vec::new();

        let live: Vec<&str> = job.functions.iter().map(|f| f.name.as_str()).collect();
        let renderer = &self.renderer;
        self.cards.retain(|name, card| {
            let keep = live.contains(&name.as_str());
            if !keep {
                renderer.cancel(&card.target);
            }
            keep
        });

        for function in &job.functions {
            if let Some(ticket) = self.upsert(function) {
                tickets.push(ticket);
            }
        }
        self.order = job.functions.iter().map(|f| f.name.clone()).collect();

        if !tickets.is_empty() {
            tracing::debug!(job_id = %job.id, renders = tickets.len(), "Diagram board updated");
        }
        tickets
    }

    fn upsert(&mut self, function: &FunctionResult) -> Option<RenderTicket> {
        match self.cards.get_mut(&function.name) {
            Some(card) => {
                card.validated = function.validated;
                if card.description == function.mermaid {
                    return None;
                }
                card.description = function.mermaid.clone();
                Some(self.renderer.render(&function.mermaid, &card.target))
            }
            None => {
                let target = DiagramTarget::new();
                let ticket = self.renderer.render(&function.mermaid, &target);
                self.cards.insert(
                    function.name.clone(),
                    Card {
                        target,
                        description: function.mermaid.clone(),
                        validated: function.validated,
                    },
                );
                Some(ticket)
            }
        }
    }

    pub fn target(&self, function: &str) -> Option<&DiagramTarget> {
        self.cards.get(function).map(|card| &card.target)
    }

    /// Cards in the order the job lists its functions.
    pub fn cards(&self) -> Vec<CardView> {
        self.order
            .iter()
            .filter_map(|name| {
                self.cards.get(name).map(|card| CardView {
                    name: name.clone(),
                    description: card.description.clone(),
                    validated: card.validated,
                    output: card.target.current(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Drop for DiagramBoard {
    fn drop(&mut self) {
        for card in self.cards.values() {
            self.renderer.cancel(&card.target);
        }
    }
}
