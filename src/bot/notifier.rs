use serenity::{async_trait, http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::audio::transport::{MessagingSink, NotifyContext};

/// Publica los avisos del controlador en el canal de texto de la guild.
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessagingSink for ChannelNotifier {
    async fn notify(&self, context: NotifyContext, text: &str) -> anyhow::Result<()> {
        ChannelId::new(context.channel_id)
            .say(self.http.as_ref(), text)
            .await?;
        Ok(())
    }
}
