mod view;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use iced::{
    event::{self, Event as IcedEvent},
    keyboard::{self, Key},
    time,
    widget::{scrollable, text_editor},
    window, Element, Subscription, Task, Theme,
};
use tokio_util::sync::CancellationToken;

use twin_chat::chat_api::{ChatClient, ChatError, ChatReply, ChatTransport};
use twin_chat::config::{Config, ThemeMode};
use twin_chat::conversation::Conversation;
use twin_chat::documents::{self, DocumentStore, SqliteDocumentCache};
use twin_chat::logging;
use twin_chat::toast::{self, TimedStatus, ToastKind, ToastQueue, DEFAULT_TOAST_TTL, UPLOAD_STATUS_TTL};
use twin_chat::upload::{self, SelectedFile, UploadClient, UploadEvent, UploadStatus, ValidationError};

const PREVIEW_CHARS: usize = 4000;

fn main() -> iced::Result {
    logging::init();
    let config = Config::load();

    let cache = match SqliteDocumentCache::in_memory() {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!(error = %e, "could not open document cache");
            std::process::exit(1);
        }
    };

    let window_settings = window::Settings {
        size: iced::Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(iced::Size::new(
            config.window.min_width as f32,
            config.window.min_height as f32,
        )),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application("Twin Chat", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window_settings)
        .run_with(move || App::new(config, cache))
}

#[derive(Debug, Clone)]
pub enum Message {
    InputAction(text_editor::Action),
    Submit,
    ChatSettled(Result<ChatReply, ChatError>),
    ToggleTheme,
    PickFile,
    FilePicked(Option<PathBuf>),
    FileDropped(PathBuf),
    FileInspected(Result<SelectedFile, ValidationError>),
    Upload(UploadEvent),
    CancelUpload,
    DismissToast(u64),
    OpenPreview(String),
    PreviewLoaded(String, Result<String, String>),
    ClosePreview,
    SaveDocument(String),
    Saved(Result<PathBuf, String>),
    CopyText(String),
    DesktopNotified(Result<(), String>),
    Tick(Instant),
}

pub struct UploadView {
    pub progress: u8,
    pub status: UploadStatus,
    cancel: CancellationToken,
}

pub struct PreviewView {
    pub name: String,
    pub timestamp: Option<String>,
    pub body: Option<Result<String, String>>,
}

pub struct App {
    config: Config,
    conversation: Conversation,
    chat_client: ChatClient,
    upload_client: UploadClient,
    cache: SqliteDocumentCache,
    input: text_editor::Content,
    /// Set while a chosen file is being read from disk, before its upload
    /// has started. Holds the upload slot so a second file cannot race in.
    inspecting: bool,
    upload: Option<UploadView>,
    status_line: TimedStatus,
    toasts: ToastQueue,
    preview: Option<PreviewView>,
    theme_mode: ThemeMode,
    loading_frame: usize,
    scroll_id: scrollable::Id,
}

impl App {
    fn new(config: Config, cache: SqliteDocumentCache) -> (Self, Task<Message>) {
        let chat_client = ChatClient::with_config(config.chat.clone());
        let upload_client = UploadClient::with_config(config.upload.clone());
        tracing::info!(
            chat_endpoint = %config.chat.endpoint,
            upload_endpoint = %config.upload.endpoint,
            backend = ?chat_client.backend(),
            "starting"
        );

        let app = App {
            theme_mode: config.ui.theme,
            config,
            conversation: Conversation::new(),
            chat_client,
            upload_client,
            cache,
            input: text_editor::Content::new(),
            inspecting: false,
            upload: None,
            status_line: TimedStatus::default(),
            toasts: ToastQueue::new(),
            preview: None,
            loading_frame: 0,
            scroll_id: scrollable::Id::unique(),
        };

        (app, Task::none())
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputAction(action) => {
                if !self.conversation.is_pending() {
                    self.input.perform(action);
                }
                Task::none()
            }
            Message::Submit => {
                let draft = self.input.text();
                let Some(text) = self.conversation.begin_send(draft.trim_end()) else {
                    return Task::none();
                };
                self.input = text_editor::Content::new();

                let client = self.chat_client.clone();
                let send = Task::perform(
                    async move { client.send_chat_message(&text).await },
                    Message::ChatSettled,
                );
                Task::batch([send, self.scroll_to_end()])
            }
            Message::ChatSettled(result) => {
                self.conversation.finish_send(result);
                self.scroll_to_end()
            }
            Message::ToggleTheme => {
                self.theme_mode = self.theme_mode.toggled();
                Task::none()
            }
            Message::PickFile => {
                if self.upload_busy() {
                    return Task::none();
                }
                Task::perform(pick_pdf(), Message::FilePicked)
            }
            Message::FilePicked(Some(path)) | Message::FileDropped(path) => self.inspect_file(path),
            Message::FilePicked(None) => Task::none(),
            Message::FileInspected(Ok(file)) => {
                self.inspecting = false;
                if self.upload.is_some() {
                    tracing::warn!(target: "upload", file = %file.name, "upload already running, file ignored");
                    return Task::none();
                }
                self.start_upload(file)
            }
            Message::FileInspected(Err(e)) => {
                self.inspecting = false;
                self.status_line.set(e.to_string(), Instant::now());
                self.notify(ToastKind::Error, e.to_string())
            }
            Message::Upload(event) => self.on_upload_event(event),
            Message::CancelUpload => {
                if let Some(upload) = &self.upload {
                    upload.cancel.cancel();
                }
                Task::none()
            }
            Message::DismissToast(id) => {
                self.toasts.dismiss(id);
                Task::none()
            }
            Message::OpenPreview(name) => self.open_preview(name),
            Message::PreviewLoaded(name, body) => {
                if let Some(preview) = self.preview.as_mut().filter(|p| p.name == name) {
                    preview.body = Some(body);
                }
                Task::none()
            }
            Message::ClosePreview => {
                self.preview = None;
                Task::none()
            }
            Message::SaveDocument(name) => self.save_document(name),
            Message::Saved(Ok(path)) => {
                self.toasts.push(
                    ToastKind::Success,
                    format!("Saved to {}", path.display()),
                    DEFAULT_TOAST_TTL,
                );
                Task::none()
            }
            Message::Saved(Err(e)) => {
                self.toasts.push(ToastKind::Error, e, UPLOAD_STATUS_TTL);
                Task::none()
            }
            Message::CopyText(content) => iced::clipboard::write(content),
            Message::DesktopNotified(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "desktop notification failed");
                }
                Task::none()
            }
            Message::Tick(now) => {
                self.toasts.expire(now);
                self.status_line.expire(now);
                if self.conversation.is_pending() || self.upload.is_some() {
                    self.loading_frame = (self.loading_frame + 1) % 80;
                }
                Task::none()
            }
        }
    }

    fn scroll_to_end(&self) -> Task<Message> {
        scrollable::snap_to(self.scroll_id.clone(), scrollable::RelativeOffset::END)
    }

    fn upload_busy(&self) -> bool {
        self.inspecting || self.upload.is_some()
    }

    fn inspect_file(&mut self, path: PathBuf) -> Task<Message> {
        if self.upload_busy() {
            self.toasts.push(
                ToastKind::Error,
                "An upload is already in progress",
                DEFAULT_TOAST_TTL,
            );
            return Task::none();
        }
        self.inspecting = true;
        Task::perform(
            async move { SelectedFile::inspect(&path).await },
            Message::FileInspected,
        )
    }

    fn start_upload(&mut self, file: SelectedFile) -> Task<Message> {
        let cancel = CancellationToken::new();
        self.upload = Some(UploadView {
            progress: 0,
            status: UploadStatus::Validating,
            cancel: cancel.clone(),
        });
        self.status_line
            .set(UploadStatus::Validating.label(0), Instant::now());

        Task::run(
            upload::upload_events(self.upload_client.clone(), Some(file), cancel),
            Message::Upload,
        )
    }

    fn on_upload_event(&mut self, event: UploadEvent) -> Task<Message> {
        match event {
            UploadEvent::Status(status) => {
                if let Some(upload) = self.upload.as_mut() {
                    upload.status = status;
                    self.status_line.set(status.label(upload.progress), Instant::now());
                }
                Task::none()
            }
            UploadEvent::Progress(percent) => {
                if let Some(upload) = self.upload.as_mut() {
                    upload.progress = percent;
                }
                Task::none()
            }
            UploadEvent::Finished(Ok(document)) => {
                self.upload = None;
                self.status_line
                    .set(UploadStatus::Done.label(100), Instant::now());
                self.conversation.append_document(document, &self.cache);
                Task::batch([
                    self.notify(ToastKind::Success, UploadStatus::Done.label(100)),
                    self.scroll_to_end(),
                ])
            }
            UploadEvent::Finished(Err(e)) => {
                self.upload = None;
                self.status_line.set(e.to_string(), Instant::now());
                self.notify(ToastKind::Error, e.to_string())
            }
        }
    }

    /// Shows a toast and, when enabled, the same text as a desktop
    /// notification.
    fn notify(&mut self, kind: ToastKind, message: String) -> Task<Message> {
        let ttl = match kind {
            ToastKind::Success => DEFAULT_TOAST_TTL,
            ToastKind::Error => UPLOAD_STATUS_TTL,
        };
        self.toasts.push(kind, message.clone(), ttl);

        if !self.config.ui.desktop_notifications {
            return Task::none();
        }
        Task::perform(
            async move {
                tokio::task::spawn_blocking(move || toast::show_desktop(kind, &message))
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.map_err(|e| e.to_string()))
            },
            Message::DesktopNotified,
        )
    }

    fn cached_bytes(&self, name: &str) -> Result<Vec<u8>, String> {
        let data = self
            .cache
            .get(name)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("\"{}\" is no longer cached", name))?;
        documents::decode_data_uri(&data).map_err(|e| e.to_string())
    }

    fn open_preview(&mut self, name: String) -> Task<Message> {
        let timestamp = self
            .conversation
            .messages()
            .iter()
            .rev()
            .filter_map(|m| m.document.as_ref())
            .find(|d| d.name() == name)
            .map(|d| d.timestamp().to_string());

        let loaded = self.cached_bytes(&name);
        self.preview = Some(PreviewView {
            name: name.clone(),
            timestamp,
            body: None,
        });

        match loaded {
            Err(e) => Task::done(Message::PreviewLoaded(name, Err(e))),
            Ok(bytes) => Task::perform(
                async move {
                    let extracted = tokio::task::spawn_blocking(move || {
                        documents::extract_preview_text(&bytes, PREVIEW_CHARS)
                    })
                    .await;
                    let body = match extracted {
                        Ok(Ok(text)) => Ok(text),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("The document could not be read".to_string()),
                    };
                    (name, body)
                },
                |(name, body)| Message::PreviewLoaded(name, body),
            ),
        }
    }

    fn save_document(&mut self, name: String) -> Task<Message> {
        let bytes = match self.cached_bytes(&name) {
            Ok(bytes) => bytes,
            Err(e) => return Task::done(Message::Saved(Err(e))),
        };
        let dir = self.config.download_dir();
        Task::perform(
            async move {
                tokio::task::spawn_blocking(move || documents::save_copy(&dir, &name, &bytes))
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.map_err(|e| format!("{:#}", e)))
            },
            Message::Saved,
        )
    }

    fn subscription(&self) -> Subscription<Message> {
        let animating = self.conversation.is_pending() || self.upload.is_some();
        let housekeeping = !self.toasts.is_empty() || self.status_line.get().is_some();

        let timer = if animating {
            time::every(Duration::from_millis(80)).map(Message::Tick)
        } else if housekeeping {
            time::every(Duration::from_millis(500)).map(Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| match event {
            IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) => Some(Message::ClosePreview),
            IcedEvent::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        view::root(self)
    }

    fn theme(&self) -> Theme {
        match self.theme_mode {
            ThemeMode::Dark => Theme::TokyoNight,
            ThemeMode::Light => Theme::Light,
        }
    }
}

/// Opens the native file picker limited to PDFs.
async fn pick_pdf() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Attach a PDF")
        .add_filter("PDF", &["pdf"])
        .pick_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}
