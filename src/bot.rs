use crate::aqi::Category;
use crate::reading::Reading;
use crate::sensor::SnapshotSource;
use crate::service::ReadingService;
use crate::telegram::{KeyboardButton, ReplyKeyboardMarkup, TelegramClient, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub const AQI_BUTTON_TEXT: &str = "Якість повітря 😷";
pub const UNAVAILABLE_TEXT: &str = "Дані з датчика тимчасово недоступні, спробуйте пізніше 🙏";

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Aqi,
    Button,
}

pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if text == AQI_BUTTON_TEXT {
        return Some(Command::Button);
    }

    // "/start@SomeBot extra" in group chats
    let command = text.split_whitespace().next()?;
    let command = command.split('@').next().unwrap_or(command);
    match command {
        "/start" => Some(Command::Start),
        "/aqi" => Some(Command::Aqi),
        _ => None,
    }
}

pub fn category_label(category: Category) -> &'static str {
    match category {
        Category::Good => "Добре 🟢",
        Category::Moderate => "Прийнятно ⚪️",
        Category::SensitiveGroups => "Ризик для людей з респіраторними хворобами 🟡",
        Category::Unhealthy => "Погано 🟠",
        Category::VeryUnhealthy => "Дуже Погано 🟠",
        Category::Hazardous => "Небезпечно 🔴",
        Category::VeryHazardous => "Дуже небезпечно 🔴🔴🔴",
    }
}

/// Picks one of the greeting phrases.
pub fn output_phrase(seed: i64) -> &'static str {
    match seed.rem_euclid(5) {
        0 => "Ось що маємо зараз",
        1 => "Наразі якість повітря така",
        2 => "Повітря у Петропавлівській Борщагівці",
        3 => "Дані із датчика",
        _ => "Зараз із повітрям маємо",
    }
}

pub fn format_reading(reading: &Reading, seed: i64) -> String {
    format!(
        "{}:\nPM2.5 AQI: *{:.0}* | {}\n",
        output_phrase(seed),
        reading.aqi_score,
        category_label(reading.category)
    )
}

pub fn reply_keyboard() -> ReplyKeyboardMarkup {
    ReplyKeyboardMarkup {
        keyboard: vec![vec![KeyboardButton {
            text: AQI_BUTTON_TEXT.to_string(),
        }]],
        resize_keyboard: true,
    }
}

pub struct Bot<S: SnapshotSource> {
    telegram: Arc<TelegramClient>,
    service: Arc<ReadingService<S>>,
    keyboard: ReplyKeyboardMarkup,
    poll_timeout_secs: u64,
    poll_error_backoff: Duration,
}

impl<S: SnapshotSource> Bot<S> {
    pub fn new(
        telegram: Arc<TelegramClient>,
        service: Arc<ReadingService<S>>,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            telegram,
            service,
            keyboard: reply_keyboard(),
            poll_timeout_secs,
            poll_error_backoff: POLL_ERROR_BACKOFF,
        }
    }

    pub fn with_poll_error_backoff(mut self, backoff: Duration) -> Self {
        self.poll_error_backoff = backoff;
        self
    }

    pub async fn run(self: Arc<Self>) {
        let mut offset = 0;
        tracing::info!("Telegram bot polling for updates");

        loop {
            match self.telegram.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(update);
                    }
                }
                Err(e) => {
                    tracing::warn!("Polling Telegram updates failed: {}", e);
                    sleep(self.poll_error_backoff).await;
                }
            }
        }
    }

    // One task per recognized message so a slow refresh never stalls polling.
    fn dispatch(self: &Arc<Self>, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(parse_command) else {
            return;
        };

        tracing::debug!("Handling {:?} from chat {}", command, message.chat.id);

        let bot = Arc::clone(self);
        tokio::spawn(async move {
            bot.reply(message.chat.id).await;
        });
    }

    pub async fn reply(&self, chat_id: i64) {
        let text = match self.service.get_reading().await {
            Ok(reading) => format_reading(&reading, self.service.now().timestamp()),
            Err(e) => {
                tracing::error!("Reading unavailable for chat {}: {}", chat_id, e);
                UNAVAILABLE_TEXT.to_string()
            }
        };

        if let Err(e) = self
            .telegram
            .send_message(chat_id, &text, Some(&self.keyboard))
            .await
        {
            tracing::error!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }
}
