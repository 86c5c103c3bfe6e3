//! Home Assistant skill: lights, rooms, sensors and scenarios.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use skald_plugin::{
    CommandContext, EffectiveOptions, Invocation, Manifest, PluginError, SkillPlugin, SpeechSink,
};

use crate::client::{HomeAssistantClient, SmartHomeAdapter};
use crate::types::Entity;

pub const PLUGIN_ID: &str = "homeassistant";

const CONNECTED: &str = "Home Assistant успешно подключен!";
const NOT_CONFIGURED_LONG: &str = "Home Assistant не настроен. Проверьте настройки плагина.";
const NOT_CONFIGURED: &str = "Home Assistant не настроен";
const UNREACHABLE: &str = "Не удалось связаться с Home Assistant";
const NO_LIGHTS: &str = "Устройства освещения не найдены";
const COMMAND_FAILED: &str = "Не удалось выполнить команду";

const MAIN_LIGHT_MARKERS: [&str; 2] = ["main", "основной"];
const NIGHT_LIGHT_MARKERS: [&str; 2] = ["ночник", "night"];
const NIGHT_LIGHT_BRIGHTNESS: u8 = 50;
const FALLBACK_LIGHTS: usize = 3;

/// Commands this skill answers, keyed by the id stored in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    LightsOn,
    LightsOff,
    LightsToggle,
    RoomLightsOn,
    RoomLightsOff,
    Temperature,
    Humidity,
    DevicesStatus,
    Bedtime,
    LeavingHome,
}

impl Command {
    const ALL: [(Command, &'static str, &'static str); 10] = [
        (Self::LightsOn, "включи свет|включи освещение", "Turn on the main lights"),
        (Self::LightsOff, "выключи свет|выключи освещение", "Turn off every light"),
        (Self::LightsToggle, "переключи свет|переключи освещение", "Toggle the main lights"),
        (Self::RoomLightsOn, "включи свет в|включи освещение в", "Turn on the lights in a room"),
        (
            Self::RoomLightsOff,
            "выключи свет в|выключи освещение в",
            "Turn off the lights in a room",
        ),
        (Self::Temperature, "температура дома|температура в доме", "Read the home temperature"),
        (Self::Humidity, "влажность дома|влажность в доме", "Read the home humidity"),
        (Self::DevicesStatus, "статус устройств|статус света", "Count lights that are on"),
        (Self::Bedtime, "готовлюсь ко сну|иду спать", "Main lights off, night lights dimmed"),
        (Self::LeavingHome, "ухожу из дома|уезжаю", "Turn off every light"),
    ];

    fn id(self) -> &'static str {
        match self {
            Self::LightsOn => "lights_on",
            Self::LightsOff => "lights_off",
            Self::LightsToggle => "lights_toggle",
            Self::RoomLightsOn => "room_lights_on",
            Self::RoomLightsOff => "room_lights_off",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::DevicesStatus => "devices_status",
            Self::Bedtime => "bedtime",
            Self::LeavingHome => "leaving_home",
        }
    }

    fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .map(|(command, _, _)| *command)
            .find(|command| command.id() == id)
    }
}

/// The Home Assistant skill.
#[derive(Default)]
pub struct HomeAssistantPlugin {
    preset: Option<Arc<dyn SmartHomeAdapter>>,
    adapter: OnceLock<Arc<dyn SmartHomeAdapter>>,
}

impl HomeAssistantPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `adapter` instead of building a REST client from options.
    pub fn with_adapter(adapter: Arc<dyn SmartHomeAdapter>) -> Self {
        Self {
            preset: Some(adapter),
            adapter: OnceLock::new(),
        }
    }

    fn connect(
        &self,
        options: &EffectiveOptions,
    ) -> Result<Arc<dyn SmartHomeAdapter>, PluginError> {
        if let Some(adapter) = &self.preset {
            return Ok(adapter.clone());
        }
        let client = HomeAssistantClient::new(
            options.str("base_url").unwrap_or_default(),
            options.str("access_token").unwrap_or_default(),
        )?;
        info!(base_url = %client.base_url(), "home assistant client ready");
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl SkillPlugin for HomeAssistantPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn declare(&self) -> Manifest {
        let manifest = Manifest::new("Home Assistant интеграция", "1.0")
            .requires_online(true)
            .with_description("Интеграция с Home Assistant для управления умным домом")
            .with_option("is_active", false)
            .with_option("base_url", "http://localhost:8123")
            .with_option("access_token", "")
            .with_option("default_room", "гостиная");
        Command::ALL
            .iter()
            .fold(manifest, |manifest, (command, pattern, description)| {
                manifest.with_command(*pattern, command.id(), *description)
            })
    }

    async fn activate(
        &self,
        speech: &dyn SpeechSink,
        options: &EffectiveOptions,
        manifest: Manifest,
    ) -> Result<Manifest, PluginError> {
        if !options.is_active() {
            return Ok(manifest.suppress_commands());
        }
        match self.connect(options) {
            Ok(adapter) => {
                // A second activation keeps the first adapter.
                let _ = self.adapter.set(adapter);
                speech.emit_speech(CONNECTED);
                Ok(manifest)
            }
            Err(e) => {
                speech.emit_speech(NOT_CONFIGURED_LONG);
                Err(e)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.adapter.get().is_some()
    }

    async fn invoke(
        &self,
        command: &str,
        ctx: &CommandContext<'_>,
        invocation: &Invocation,
    ) -> Result<(), PluginError> {
        let command = Command::from_id(command).ok_or_else(|| {
            PluginError::NotImplemented(format!("{PLUGIN_ID} has no command '{command}'"))
        })?;
        let Some(adapter) = self.adapter.get() else {
            ctx.say(NOT_CONFIGURED);
            return Err(PluginError::ConfigurationMissing(
                "home assistant base_url and access_token".into(),
            ));
        };
        let adapter = adapter.as_ref();

        match command {
            Command::LightsOn => lights_on(adapter, ctx).await,
            Command::LightsOff => {
                all_lights_off(adapter, ctx, "Все источники света выключены").await
            }
            Command::LightsToggle => lights_toggle(adapter, ctx).await,
            Command::RoomLightsOn => room_lights(adapter, ctx, invocation, true).await,
            Command::RoomLightsOff => room_lights(adapter, ctx, invocation, false).await,
            Command::Temperature => temperature(adapter, ctx).await,
            Command::Humidity => humidity(adapter, ctx).await,
            Command::DevicesStatus => devices_status(adapter, ctx).await,
            Command::Bedtime => bedtime(adapter, ctx).await,
            Command::LeavingHome => {
                all_lights_off(
                    adapter,
                    ctx,
                    "Сценарий ухода из дома активирован. Все источники света выключены.",
                )
                .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Fetch lights, speaking the negative result when there are none.
async fn lights_or_say(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
    empty_message: &str,
) -> Result<Option<Vec<Entity>>, PluginError> {
    match adapter.list_entities("light.").await {
        Ok(lights) if lights.is_empty() => {
            ctx.say(empty_message);
            Ok(None)
        }
        Ok(lights) => Ok(Some(lights)),
        Err(e) => {
            ctx.say(UNREACHABLE);
            Err(e)
        }
    }
}

async fn sensors_or_say(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<Vec<Entity>, PluginError> {
    adapter.list_entities("sensor.").await.inspect_err(|_| ctx.say(UNREACHABLE))
}

async fn light_service(adapter: &dyn SmartHomeAdapter, service: &str, lights: &[&Entity]) -> usize {
    let mut ok = 0;
    for light in lights {
        if adapter
            .invoke_service("light", service, json!({"entity_id": light.entity_id}))
            .await
        {
            ok += 1;
        }
    }
    ok
}

/// Speak `message` when at least one call went through.
fn report(
    ctx: &CommandContext<'_>,
    attempted: usize,
    succeeded: usize,
    message: &str,
) -> Result<(), PluginError> {
    if attempted > 0 && succeeded == 0 {
        ctx.say(COMMAND_FAILED);
        return Err(PluginError::AdapterUnavailable(format!(
            "all {attempted} service calls failed"
        )));
    }
    ctx.say(message);
    Ok(())
}

fn is_main(light: &Entity) -> bool {
    MAIN_LIGHT_MARKERS.iter().any(|marker| light.name_contains(marker))
}

fn is_night(light: &Entity) -> bool {
    NIGHT_LIGHT_MARKERS.iter().any(|marker| light.name_contains(marker))
}

async fn lights_on(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    let Some(lights) = lights_or_say(adapter, ctx, NO_LIGHTS).await? else {
        return Ok(());
    };
    let main: Vec<&Entity> = lights.iter().filter(|l| is_main(l)).collect();
    if main.is_empty() {
        let first: Vec<&Entity> = lights.iter().take(FALLBACK_LIGHTS).collect();
        let ok = light_service(adapter, "turn_on", &first).await;
        report(ctx, first.len(), ok, "Освещение включено")
    } else {
        let ok = light_service(adapter, "turn_on", &main).await;
        report(ctx, main.len(), ok, "Основное освещение включено")
    }
}

async fn all_lights_off(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
    message: &str,
) -> Result<(), PluginError> {
    let Some(lights) = lights_or_say(adapter, ctx, NO_LIGHTS).await? else {
        return Ok(());
    };
    let all: Vec<&Entity> = lights.iter().collect();
    let ok = light_service(adapter, "turn_off", &all).await;
    report(ctx, all.len(), ok, message)
}

async fn lights_toggle(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    let Some(lights) = lights_or_say(adapter, ctx, NO_LIGHTS).await? else {
        return Ok(());
    };
    let main: Vec<&Entity> = lights.iter().filter(|l| is_main(l)).collect();
    if main.is_empty() {
        ctx.say("Основные источники света не найдены");
        return Ok(());
    }
    let ok = light_service(adapter, "toggle", &main).await;
    report(ctx, main.len(), ok, "Состояние освещения переключено")
}

async fn room_lights(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
    invocation: &Invocation,
    turn_on: bool,
) -> Result<(), PluginError> {
    let room = match invocation.argument() {
        Some(room) => room.to_string(),
        None => ctx
            .options
            .non_empty_str("default_room")
            .unwrap_or("гостиная")
            .to_string(),
    };
    let Some(lights) = lights_or_say(adapter, ctx, NO_LIGHTS).await? else {
        return Ok(());
    };
    let in_room: Vec<&Entity> = lights.iter().filter(|l| room_matches(l, &room)).collect();
    if in_room.is_empty() {
        ctx.say(format!("Светильники в {room} не найдены"));
        return Ok(());
    }
    let (service, verb) = if turn_on {
        ("turn_on", "включен")
    } else {
        ("turn_off", "выключен")
    };
    let ok = light_service(adapter, service, &in_room).await;
    report(ctx, in_room.len(), ok, &format!("Свет в {room} {verb}"))
}

/// Room names arrive inflected ("в спальне"); also try the stem.
fn room_matches(light: &Entity, room: &str) -> bool {
    if light.name_contains(room) {
        return true;
    }
    let stem = room_stem(room);
    stem.chars().count() >= 3 && light.name_contains(&stem)
}

fn room_stem(room: &str) -> String {
    const ENDINGS: &str = "аеёиоуыэюяйь";
    let mut chars: Vec<char> = room.trim().to_lowercase().chars().collect();
    for _ in 0..2 {
        match chars.last() {
            Some(c) if ENDINGS.contains(*c) && chars.len() > 3 => {
                chars.pop();
            }
            _ => break,
        }
    }
    chars.into_iter().collect()
}

async fn read_sensor(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
    sensor: &Entity,
) -> Result<Option<f64>, PluginError> {
    match adapter.get_entity(&sensor.entity_id).await {
        Ok(entity) => Ok(entity.and_then(|e| e.numeric_state())),
        Err(e) => {
            ctx.say(UNREACHABLE);
            Err(e)
        }
    }
}

async fn temperature(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    const NOT_FOUND: &str = "Датчики температуры не найдены";
    let sensors = sensors_or_say(adapter, ctx).await?;
    let Some(sensor) = sensors.iter().find(|s| {
        let id = s.entity_id.to_lowercase();
        id.contains("temperature") || id.contains("temp")
    }) else {
        ctx.say(NOT_FOUND);
        return Ok(());
    };
    match read_sensor(adapter, ctx, sensor).await? {
        Some(value) => ctx.say(format!("Температура в доме {} градусов", format_reading(value))),
        None => ctx.say("Не удалось получить показания температуры"),
    }
    Ok(())
}

async fn humidity(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    const NOT_FOUND: &str = "Датчики влажности не найдены";
    let sensors = sensors_or_say(adapter, ctx).await?;
    let Some(sensor) = sensors
        .iter()
        .find(|s| s.entity_id.to_lowercase().contains("humidity") || s.name_contains("влажность"))
    else {
        ctx.say(NOT_FOUND);
        return Ok(());
    };
    match read_sensor(adapter, ctx, sensor).await? {
        Some(value) => ctx.say(format!("Влажность в доме {} процентов", format_reading(value))),
        None => ctx.say("Не удалось получить показания влажности"),
    }
    Ok(())
}

async fn devices_status(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    let Some(lights) = lights_or_say(adapter, ctx, "Устройства не найдены").await? else {
        return Ok(());
    };
    let on = lights.iter().filter(|l| l.is_on()).count();
    let total = lights.len();
    if on == 0 {
        ctx.say("Все источники света выключены");
    } else if on == total {
        ctx.say("Все источники света включены");
    } else {
        ctx.say(format!("Включено {on} из {total} источников света"));
    }
    Ok(())
}

async fn bedtime(
    adapter: &dyn SmartHomeAdapter,
    ctx: &CommandContext<'_>,
) -> Result<(), PluginError> {
    let Some(lights) = lights_or_say(adapter, ctx, NO_LIGHTS).await? else {
        return Ok(());
    };
    let main: Vec<&Entity> = lights.iter().filter(|l| is_main(l)).collect();
    let night: Vec<&Entity> = lights.iter().filter(|l| is_night(l)).collect();

    let mut ok = light_service(adapter, "turn_off", &main).await;
    for light in &night {
        let args = json!({"entity_id": light.entity_id, "brightness": NIGHT_LIGHT_BRIGHTNESS});
        if adapter.invoke_service("light", "turn_on", args).await {
            ok += 1;
        } else {
            warn!(entity = %light.entity_id, "night light did not turn on");
        }
    }
    report(
        ctx,
        main.len() + night.len(),
        ok,
        "Сценарий подготовки ко сну активирован. Основное освещение выключено, ночник включен.",
    )
}

/// `21.0` reads as "21", `21.5` stays "21.5".
fn format_reading(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_round_trip() {
        for (command, _, _) in Command::ALL {
            assert_eq!(Command::from_id(command.id()), Some(command));
        }
        assert_eq!(Command::from_id("dance"), None);
    }

    #[test]
    fn manifest_is_valid_and_self_consistent() {
        let manifest = HomeAssistantPlugin::new().declare();
        manifest.validate().unwrap();
        assert_eq!(manifest.commands.len(), Command::ALL.len());
        assert_eq!(manifest.default_options["is_active"], false);
        assert_eq!(manifest.default_options["default_room"], "гостиная");
    }

    #[test]
    fn room_stems() {
        assert_eq!(room_stem("спальне"), "спальн");
        assert_eq!(room_stem("гостиной"), "гостин");
        assert_eq!(room_stem("кухне"), "кухн");
        assert_eq!(room_stem("зал"), "зал");
    }

    #[test]
    fn room_matching_uses_stem() {
        let light =
            Entity::new("light.a", "off").with_attribute("friendly_name", "Спальня потолок");
        assert!(room_matches(&light, "спальне"));
        assert!(room_matches(&light, "Спальня"));
        assert!(!room_matches(&light, "кухне"));
    }

    #[test]
    fn readings_drop_trailing_zero() {
        assert_eq!(format_reading(21.0), "21");
        assert_eq!(format_reading(21.5), "21.5");
        assert_eq!(format_reading(-3.0), "-3");
    }
}
