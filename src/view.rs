use iced::{
    alignment,
    keyboard::{self, key, Key},
    widget::{
        button, column, container, horizontal_space, progress_bar, row, scrollable, text,
        text_editor::Binding,
        Column,
    },
    Border, Element, Font, Length, Padding, Theme,
};

use twin_chat::config::ThemeMode;
use twin_chat::conversation::{ChatMessage, Phase, Sender};
use twin_chat::documents::display_name;
use twin_chat::markdown::{self, Block};
use twin_chat::toast::ToastKind;
use twin_chat::upload::UploadStatus;

use crate::{App, Message};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const BUBBLE_WIDTH: f32 = 360.0;

pub fn root(app: &App) -> Element<'_, Message> {
    let body: Element<Message> = if let Some(preview) = &app.preview {
        preview_panel(preview)
    } else {
        match app.conversation.phase() {
            Phase::Welcome => welcome(app),
            Phase::Active => session(app),
        }
    };

    let mut content = column![header(app), body].spacing(10).padding(10);
    if let Some(toasts) = toasts(app) {
        content = content.push(toasts);
    }

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn header(app: &App) -> Element<'_, Message> {
    let label = match app.theme_mode {
        ThemeMode::Dark => "[Light]",
        ThemeMode::Light => "[Dark]",
    };
    row![
        text("Twin Chat").size(18),
        horizontal_space(),
        button(text(label).size(14))
            .on_press(Message::ToggleTheme)
            .padding(6),
    ]
    .align_y(alignment::Vertical::Center)
    .into()
}

fn welcome(app: &App) -> Element<'_, Message> {
    container(
        column![
            text("How can I help you?").size(28),
            input_bar(app, "Type here and ask..."),
            upload_area(app),
        ]
        .spacing(16)
        .align_x(alignment::Horizontal::Center),
    )
    .width(Length::Fill)
    .height(Length::Fill)
    .align_x(alignment::Horizontal::Center)
    .align_y(alignment::Vertical::Center)
    .into()
}

fn session(app: &App) -> Element<'_, Message> {
    let mut list = Column::new().spacing(12).padding(Padding::from([10, 4]));
    for message in app.conversation.messages() {
        list = list.push(chat_message(message));
    }
    if app.conversation.is_pending() {
        list = list.push(typing_indicator(app.loading_frame));
    }

    let messages = scrollable(list)
        .id(app.scroll_id.clone())
        .height(Length::Fill)
        .width(Length::Fill);

    column![
        messages,
        upload_area(app),
        input_bar(app, "Type your message..."),
    ]
    .spacing(10)
    .height(Length::Fill)
    .into()
}

fn input_bar<'a>(app: &'a App, placeholder: &'a str) -> Element<'a, Message> {
    let pending = app.conversation.is_pending();

    let mut input = iced::widget::text_editor(&app.input)
        .placeholder(placeholder)
        .height(Length::Shrink)
        .padding(12)
        .size(16)
        .key_binding(|key_press| {
            if sends_draft(&key_press.key, key_press.modifiers) {
                Some(Binding::Custom(Message::Submit))
            } else {
                Binding::from_key_press(key_press)
            }
        });
    if !pending {
        input = input.on_action(Message::InputAction);
    }

    let can_send = !pending && !app.input.text().trim().is_empty();
    let send = button(text(if pending { "Sending..." } else { "Send" }).size(16))
        .on_press_maybe(can_send.then_some(Message::Submit))
        .padding(12);

    row![input, send]
        .spacing(8)
        .align_y(alignment::Vertical::Bottom)
        .into()
}

/// Enter sends the draft, Shift+Enter inserts a newline.
fn sends_draft(key: &Key, modifiers: keyboard::Modifiers) -> bool {
    matches!(key, Key::Named(key::Named::Enter)) && !modifiers.shift()
}

fn upload_area(app: &App) -> Element<'_, Message> {
    if let Some(upload) = &app.upload {
        let label = match upload.status {
            UploadStatus::Uploading => upload.status.label(upload.progress),
            _ => app
                .status_line
                .get()
                .map(str::to_string)
                .unwrap_or_else(|| upload.status.label(upload.progress)),
        };
        let spinner = SPINNER[app.loading_frame % SPINNER.len()];

        return column![
            progress_bar(0.0..=100.0, upload.progress as f32).height(Length::Fixed(6.0)),
            row![
                text(spinner).size(14),
                text(label).size(14),
                horizontal_space(),
                button(text("Cancel").size(14))
                    .on_press(Message::CancelUpload)
                    .padding(6),
            ]
            .spacing(8)
            .align_y(alignment::Vertical::Center),
        ]
        .spacing(6)
        .into();
    }

    let mut area = column![row![
        button(text("[Attach PDF]").size(14))
            .on_press_maybe((!app.inspecting).then_some(Message::PickFile))
            .padding(6),
        text("or drop a PDF on the window. Maximum file size: 10MB").size(12),
    ]
    .spacing(10)
    .align_y(alignment::Vertical::Center)]
    .spacing(6);

    if let Some(status) = app.status_line.get() {
        area = area.push(text(status.to_string()).size(13));
    }
    area.into()
}

fn chat_message(message: &ChatMessage) -> Element<'_, Message> {
    let content: Element<Message> = match (&message.document, &message.text) {
        (Some(document), _) if message.is_document => {
            let name = document.name().to_string();
            button(
                row![
                    text("[PDF]").font(Font::MONOSPACE).size(13),
                    text(display_name(&name, 32)).size(14),
                ]
                .spacing(8),
            )
            .on_press(Message::OpenPreview(name))
            .padding(8)
            .into()
        }
        (_, Some(body)) if message.sender == Sender::Bot => bot_text(body),
        (_, Some(body)) => text(body.clone()).size(15).into(),
        _ => text("").into(),
    };

    let sender = message.sender;
    let bubble = container(content)
        .padding(10)
        .max_width(BUBBLE_WIDTH)
        .style(move |theme: &Theme| bubble_style(theme, sender));

    match sender {
        Sender::User => row![horizontal_space(), bubble].into(),
        Sender::Bot => row![bubble, horizontal_space()].into(),
    }
}

fn bot_text(body: &str) -> Element<'_, Message> {
    let mut col = Column::new().spacing(8);
    for block in markdown::parse(body) {
        col = col.push(block_view(block));
    }
    col.into()
}

fn block_view(block: Block) -> Element<'static, Message> {
    match block {
        Block::Heading { level, text: t } => {
            let size = match level {
                1 => 22.0,
                2 => 19.0,
                3 => 17.0,
                _ => 15.0,
            };
            text(t).size(size).into()
        }
        Block::Paragraph(t) => text(t).size(15).into(),
        Block::Quote(t) => container(text(t).size(15))
            .padding(Padding::from([2, 10]))
            .style(quote_style)
            .into(),
        Block::ListItem { depth, marker, text: t } => row![
            text(marker).size(15).width(Length::Fixed(24.0)),
            text(t).size(15),
        ]
        .padding(Padding {
            left: depth as f32 * 16.0,
            ..Padding::ZERO
        })
        .into(),
        Block::Code { language, code } => {
            let header = row![
                text(language.unwrap_or_default())
                    .font(Font::MONOSPACE)
                    .size(12),
                horizontal_space(),
                button(text("[Copy]").size(12))
                    .on_press(Message::CopyText(code.clone()))
                    .padding(4),
            ]
            .align_y(alignment::Vertical::Center);
            container(column![header, text(code).font(Font::MONOSPACE).size(13)].spacing(4))
                .padding(8)
                .width(Length::Fill)
                .style(code_style)
                .into()
        }
        Block::Rule => text("──────────").size(12).into(),
    }
}

fn typing_indicator(frame: usize) -> Element<'static, Message> {
    let spinner = SPINNER[frame % SPINNER.len()];
    let bubble = container(row![text(spinner).size(18), text("Thinking...").size(14)].spacing(8))
        .padding(10)
        .style(|theme: &Theme| bubble_style(theme, Sender::Bot));
    row![bubble, horizontal_space()].into()
}

fn preview_panel(preview: &crate::PreviewView) -> Element<'_, Message> {
    let body: Element<Message> = match &preview.body {
        None => text("Reading document...").size(14).into(),
        Some(Ok(content)) => text(content.clone()).size(14).into(),
        Some(Err(e)) => text(format!("Preview unavailable: {}", e)).size(14).into(),
    };

    let mut heading = column![text(preview.name.clone()).size(20)].spacing(4);
    if let Some(ts) = &preview.timestamp {
        heading = heading.push(text(format!("Uploaded {}", ts)).size(12));
    }

    column![
        heading,
        scrollable(container(body).padding(10).width(Length::Fill)).height(Length::Fill),
        row![
            button(text("Save a copy").size(14))
                .on_press(Message::SaveDocument(preview.name.clone()))
                .padding(8),
            horizontal_space(),
            button(text("Close").size(14))
                .on_press(Message::ClosePreview)
                .padding(8),
        ],
    ]
    .spacing(10)
    .height(Length::Fill)
    .into()
}

fn toasts(app: &App) -> Option<Element<'_, Message>> {
    if app.toasts.is_empty() {
        return None;
    }
    let mut col = Column::new().spacing(6);
    for toast in app.toasts.iter() {
        let kind = toast.kind;
        col = col.push(
            container(
                row![
                    text(toast.message.clone()).size(14),
                    horizontal_space(),
                    button(text("×").size(14))
                        .on_press(Message::DismissToast(toast.id))
                        .padding(Padding::from([0, 6])),
                ]
                .align_y(alignment::Vertical::Center),
            )
            .padding(8)
            .width(Length::Fill)
            .style(move |theme: &Theme| toast_style(theme, kind)),
        );
    }
    Some(col.into())
}

fn bubble_style(theme: &Theme, sender: Sender) -> container::Style {
    let palette = theme.extended_palette();
    let pair = match sender {
        Sender::User => palette.primary.base,
        Sender::Bot => palette.background.weak,
    };
    container::Style {
        background: Some(pair.color.into()),
        text_color: Some(pair.text),
        border: Border {
            radius: 12.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn code_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.background.strong.color.into()),
        text_color: Some(palette.background.strong.text),
        border: Border {
            radius: 6.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn quote_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        border: Border {
            color: palette.secondary.base.color,
            width: 1.0,
            radius: 2.0.into(),
        },
        ..container::Style::default()
    }
}

fn toast_style(theme: &Theme, kind: ToastKind) -> container::Style {
    let palette = theme.extended_palette();
    let pair = match kind {
        ToastKind::Success => palette.success.base,
        ToastKind::Error => palette.danger.base,
    };
    container::Style {
        background: Some(pair.color.into()),
        text_color: Some(pair.text),
        border: Border {
            radius: 8.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}
