use moshimo_core::{
    CompletionError, Config, ConversationController, ErrorKind, GenerationConfig, Persona,
    PersonaCatalog, Provider, Rejected, Resolution, Role, TurnOutcome,
};
use ratatui::widgets::ListState;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One-line status shown under the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

/// The spawned remote call for the current turn.
struct InFlight {
    epoch: u64,
    persona: usize,
    handle: JoinHandle<Resolution>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Persona picker
    pub catalog: Arc<PersonaCatalog>,
    pub persona_state: ListState,

    // Generation settings, re-read on every submit
    pub generation: GenerationConfig,

    // Conversation
    pub controller: ConversationController,
    pub provider: Provider,
    in_flight: Option<InFlight>,
    // Catalog index of the persona behind each assistant turn, in order
    reply_personas: Vec<usize>,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat view
    pub notice: Option<Notice>,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Write persona/settings changes back to the config file
    persist: bool,
}

impl App {
    pub fn new(
        catalog: Arc<PersonaCatalog>,
        controller: ConversationController,
        provider: Provider,
        persona_index: usize,
        generation: GenerationConfig,
    ) -> Self {
        let mut persona_state = ListState::default();
        persona_state.select(Some(persona_index.min(catalog.len().saturating_sub(1))));

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            catalog,
            persona_state,
            generation,
            controller,
            provider,
            in_flight: None,
            reply_personas: Vec::new(),
            input: String::new(),
            cursor: 0,
            notice: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            persist: true,
        }
    }

    fn selected_index(&self) -> usize {
        self.persona_state
            .selected()
            .unwrap_or(0)
            .min(self.catalog.len().saturating_sub(1))
    }

    pub fn selected_persona(&self) -> &Persona {
        // The catalog never loads empty
        &self.catalog.list()[self.selected_index()]
    }

    pub fn is_thinking(&self) -> bool {
        self.controller.is_awaiting()
    }

    pub fn conversation_count(&self) -> usize {
        self.controller.session().exchange_count()
    }

    /// Send the input box contents as the next user turn.
    pub fn submit_input(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let persona_index = self.selected_index();
        let persona = &catalog.list()[persona_index];

        match self.controller.submit(&self.input, persona, &self.generation) {
            Ok(pending) => {
                let epoch = pending.epoch();
                self.in_flight = Some(InFlight {
                    epoch,
                    persona: persona_index,
                    handle: tokio::spawn(pending.run()),
                });

                self.input.clear();
                self.cursor = 0;
                self.notice = None;

                // Scroll to bottom so "Thinking..." is visible
                self.scroll_to_bottom();
            }
            Err(Rejected::EmptyInput) => {}
            Err(Rejected::Busy) => {
                self.notice = Some(Notice::Info(
                    "Still waiting for the previous reply...".to_string(),
                ));
            }
        }
    }

    /// Collect the reply once the spawned request has finished.
    pub async fn poll_pending(&mut self) {
        let finished = self
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.handle.is_finished());
        if !finished {
            return;
        }
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let resolution = match in_flight.handle.await {
            Ok(resolution) => resolution,
            Err(e) => Resolution::new(
                in_flight.epoch,
                Err(CompletionError::new(
                    ErrorKind::Network,
                    format!("request task failed: {}", e),
                )),
            ),
        };

        match self.controller.resolve(resolution) {
            TurnOutcome::Replied(_) => {
                self.reply_personas.push(in_flight.persona);
                self.notice = None;
                self.scroll_to_bottom();
            }
            TurnOutcome::Discarded => {
                self.notice = Some(Notice::Info(
                    "Dropped a reply that arrived after the reset".to_string(),
                ));
            }
            TurnOutcome::Failed(error) => {
                self.notice = Some(Notice::Error(error.to_string()));
                self.scroll_to_bottom();
            }
        }
    }

    /// Clear the conversation. Works while a reply is pending; that reply is
    /// dropped when it arrives.
    pub fn reset_conversation(&mut self) {
        self.controller.reset();
        self.reply_personas.clear();
        self.chat_scroll = 0;
        self.notice = None;
    }

    pub fn persona_nav_down(&mut self) {
        let next = (self.selected_index() + 1) % self.catalog.len().max(1);
        self.select_persona(next);
    }

    pub fn persona_nav_up(&mut self) {
        let len = self.catalog.len().max(1);
        let prev = (self.selected_index() + len - 1) % len;
        self.select_persona(prev);
    }

    fn select_persona(&mut self, index: usize) {
        if index == self.selected_index() {
            return;
        }
        self.persona_state.select(Some(index));

        let name = self.selected_persona().name().to_string();
        tracing::info!(persona = %name, "persona selected");
        if !self.controller.session().is_empty() {
            self.notice = Some(Notice::Info(format!(
                "Now talking to {}. Earlier messages are kept (r to start over)",
                name
            )));
        }

        if self.persist {
            if let Err(e) = Config::save_last_persona(&name) {
                tracing::warn!("could not save persona selection: {:#}", e);
                self.notice = Some(Notice::Error(format!("Selection not saved: {:#}", e)));
            }
        }
    }

    pub fn adjust_temperature(&mut self, steps: i32) {
        self.update_generation(self.generation.nudge_temperature(steps));
    }

    pub fn adjust_max_tokens(&mut self, steps: i32) {
        self.update_generation(self.generation.nudge_max_output_tokens(steps));
    }

    fn update_generation(&mut self, generation: GenerationConfig) {
        if generation == self.generation {
            return;
        }
        self.generation = generation;

        if self.persist {
            if let Err(e) = Config::save_generation(generation) {
                tracing::warn!("could not save generation settings: {:#}", e);
                self.notice = Some(Notice::Error(format!("Settings not saved: {:#}", e)));
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_thinking() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_half_page_up(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_sub(half);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_add(half);
    }

    /// Scroll chat to bottom so the newest message is visible
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;

        for turn in self.controller.session().turns() {
            total_lines = total_lines.saturating_add(2); // Speaker line and blank separator
            for line in turn.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
        }

        if self.is_thinking() {
            total_lines = total_lines.saturating_add(2);
        }
        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    /// Persona that wrote the `reply`-th assistant turn.
    pub fn reply_persona(&self, reply: usize) -> &Persona {
        self.reply_personas
            .get(reply)
            .and_then(|&index| self.catalog.get(index))
            .unwrap_or_else(|| self.selected_persona())
    }

    /// Persona the pending request was sent as.
    pub fn pending_persona(&self) -> &Persona {
        self.in_flight
            .as_ref()
            .and_then(|in_flight| self.catalog.get(in_flight.persona))
            .unwrap_or_else(|| self.selected_persona())
    }

    /// Speaker line for a turn in the chat view.
    pub fn speaker_label(&self, role: Role, persona: &Persona) -> String {
        match role {
            Role::User => "You:".to_string(),
            Role::Assistant => match persona.avatar() {
                Some(avatar) => format!("{} {}:", avatar, persona.name()),
                None => format!("{}:", persona.name()),
            },
            Role::System => "System:".to_string(),
        }
    }
}
