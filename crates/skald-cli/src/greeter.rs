//! Built-in greeter skill: a smoke test for the whole pipeline.

use async_trait::async_trait;

use skald_plugin::{CommandContext, Invocation, Manifest, PluginError, SkillPlugin};

pub const PLUGIN_ID: &str = "greeter";

const DEFAULT_MESSAGE: &str = "Тестовый плагин работает!";

#[derive(Debug, Default)]
pub struct GreeterPlugin;

#[async_trait]
impl SkillPlugin for GreeterPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn declare(&self) -> Manifest {
        Manifest::new("Тестовый плагин", "1.0")
            .with_description("Простой тестовый плагин для проверки ассистента")
            .with_option("is_active", true)
            .with_option("test_message", DEFAULT_MESSAGE)
            .with_command("тест|привет|тестовый плагин", "hello", "Say the test message")
            .with_command("как дела|как дела у ирины", "how_are_you", "Report how the assistant is")
            .with_command("время|который час", "time", "Say the local time")
    }

    async fn invoke(
        &self,
        command: &str,
        ctx: &CommandContext<'_>,
        _invocation: &Invocation,
    ) -> Result<(), PluginError> {
        match command {
            "hello" => {
                let message = ctx.options.non_empty_str("test_message");
                ctx.say(message.unwrap_or(DEFAULT_MESSAGE));
            }
            "how_are_you" => ctx.say(
                "У меня все отлично! Я готова помогать вам с музыкой и умным домом.",
            ),
            "time" => ctx.say(format!("Сейчас {}", chrono::Local::now().format("%H:%M"))),
            other => {
                return Err(PluginError::NotImplemented(format!(
                    "{PLUGIN_ID} has no command '{other}'"
                )));
            }
        }
        Ok(())
    }
}
