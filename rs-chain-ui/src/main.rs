use std::time::Duration;

use eframe::{egui, Frame};
use egui::Context;

use reqwest::blocking::Client;
use reqwest::Result;

const SERVER: &str = "http://127.0.0.1:5000";

/// REST context holding a reusable blocking HTTP client.
struct RESTContext {
    client: Client,
}

impl RESTContext {
    /// Creates a new REST context with a timeout.
    fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::new(5, 0))
            .build()?;
        Ok(Self { client })
    }

    /// Sends a POST request to `/v1/message`. An empty body means the bot
    /// stayed quiet.
    fn post_message(&self, channel: &str, text: &str, addressed: bool) -> Result<String> {
        let response = self.client
            .post(format!("{SERVER}/v1/message"))
            .query(&[
                ("channel", channel),
                ("text", text),
                ("addressed", if addressed { "true" } else { "false" }),
            ])
            .send()?
            .error_for_status()?;

        response.text()
    }

    /// Sends a GET request to `/v1/generate`, with a seed if one is given.
    fn get_generated(&self, channel: &str, seed: &str) -> Result<String> {
        let mut params = vec![("channel", channel)];
        if !seed.trim().is_empty() {
            params.push(("seed", seed));
        }

        let response = self.client
            .get(format!("{SERVER}/v1/generate"))
            .query(&params)
            .send()?;

        // Chain errors come back as 400 with a readable body
        if response.status().is_client_error() {
            return Ok(format!("Error: {}", response.text()?));
        }
        response.error_for_status()?.text()
    }

    /// Sends a GET request to `/v1/channels`.
    fn get_channels(&self) -> Result<String> {
        let response = self.client
            .get(format!("{SERVER}/v1/channels"))
            .send()?
            .error_for_status()?;

        response.text()
    }
}

/// Global UI state (MUST persist between frames in egui).
struct ChatUI {
    rest: RESTContext,
    channel: String,
    nick: String,
    message: String,
    addressed: bool,
    seed: String,
    transcript: Vec<String>,
    available_channels: Vec<String>,
}

impl ChatUI {
    /// Initializes the UI with sane defaults.
    fn new() -> Result<Self> {
        let mut ui = Self {
            rest: RESTContext::new()?,
            channel: "#rs-chain".to_owned(),
            nick: "me".to_owned(),
            message: String::new(),
            addressed: false,
            seed: String::new(),
            transcript: Vec::new(),
            available_channels: Vec::new(),
        };
        ui.get_channels();
        Ok(ui)
    }

    /// Sends the current message and records the bot's answer, if any.
    fn send_message(&mut self) {
        let text = self.message.trim().to_owned();
        if text.is_empty() {
            return;
        }
        self.transcript.push(format!("{} <{}> {}", self.channel, self.nick, text));
        match self.rest.post_message(&self.channel, &text, self.addressed) {
            Ok(reply) if reply.is_empty() => {}
            Ok(reply) => self.transcript.push(format!("{} <bot> {}", self.channel, reply)),
            Err(e) => self.transcript.push(format!("Error: {e}")),
        }
        self.message.clear();
    }

    /// Performs the generation request.
    fn get_generated(&mut self) {
        match self.rest.get_generated(&self.channel, &self.seed) {
            Ok(phrase) => self.transcript.push(format!("{} <bot> {}", self.channel, phrase)),
            Err(e) => self.transcript.push(format!("Error: {e}")),
        }
    }

    /// Refreshes the list of channels known to the server.
    fn get_channels(&mut self) {
        match self.rest.get_channels() {
            Ok(list) => {
                self.available_channels = list
                    .lines()
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .collect()
            }
            Err(e) => self.transcript.push(format!("Error: {e}")),
        }
    }
}

impl eframe::App for ChatUI {
    /// UI update loop (called every frame).
    fn update(&mut self, ctx: &Context, _: &mut Frame) {
        egui::TopBottomPanel::bottom("input_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Message");
                let response = ui.text_edit_singleline(&mut self.message);
                ui.checkbox(&mut self.addressed, "Addressed to bot");
                let pressed_enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Send").clicked() || pressed_enter {
                    self.send_message();
                }
            });
            ui.horizontal(|ui| {
                ui.label("Seed");
                ui.text_edit_singleline(&mut self.seed);
                if ui.button("Generate").clicked() {
                    self.get_generated();
                }
            });
        });

        egui::SidePanel::left("channel_panel").show(ctx, |ui| {
            egui::Grid::new("identity_grid")
                .num_columns(2)
                .spacing([10.0, 6.0])
                .show(ui, |ui| {
                    ui.label("Channel");
                    ui.text_edit_singleline(&mut self.channel);
                    ui.end_row();

                    ui.label("Nick");
                    ui.text_edit_singleline(&mut self.nick);
                    ui.end_row();
                });

            ui.separator();
            if ui.button("Refresh channels").clicked() {
                self.get_channels();
            }
            for channel in &self.available_channels {
                ui.selectable_value(&mut self.channel, channel.clone(), channel);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    if self.transcript.is_empty() {
                        ui.label("Send a message or click Generate to start");
                    }
                    for line in &self.transcript {
                        ui.label(line);
                    }
                });
        });
    }
}

/// Application entry point.
fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "rs-chain",
        options,
        Box::new(|_| Ok(Box::new(ChatUI::new()?))),
    )
}
