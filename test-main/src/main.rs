mod config;

use std::env::var;
use std::str::FromStr;
use std::thread::sleep;
use std::time::Duration;
use dotenv::dotenv;
use embedded_hal::delay::DelayNs;
use eyre::WrapErr;
use log::{debug, info};
use sysinfo::System;
use tinylcd_gpio::delay::StdDelay;
use tinylcd_gpio::expander::Mcp23017;
use tinylcd_gpio::i2c::{I2cBus, RawI2cBus};
use tinylcd_gpio::lcd::hd44780::{Backlight, Buttons, CharLcd, Font, HD44780Driver, ShieldPins};
use tinylcd_gpio::sim::{RecordingDelay, SimulatedMcp23017};
use crate::config::Config;

/// A bell, drawn in the first custom glyph slot.
const BELL: [u8; 8] = [0x04, 0x0E, 0x0E, 0x0E, 0x1F, 0x00, 0x04, 0x00];

/// Buttons and the backlight color they select.
const BUTTON_COLORS: [(u8, Backlight); 5] = [
    (Buttons::UP, Backlight::RED),
    (Buttons::DOWN, Backlight::YELLOW),
    (Buttons::LEFT, Backlight::GREEN),
    (Buttons::RIGHT, Backlight::TEAL),
    (Buttons::SELECT, Backlight::VIOLET),
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of polls in simulation mode, each pressing the next button.
const SIMULATED_POLLS: usize = 10;

fn env_or<T: FromStr>(name: &str, default: T) -> eyre::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .wrap_err_with(|| format!("Invalid {}: {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

struct Settings {
    columns: u8,
    lines: u8,
    config: Config,
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    let selector: u8 = env_or("TINYLCD_I2C_ADDRESS", 0)?;
    let simulate: bool = env_or("TINYLCD_SIMULATE", false)?;
    let settings = Settings {
        columns: env_or("TINYLCD_COLUMNS", 16)?,
        lines: env_or("TINYLCD_LINES", 2)?,
        config: Config::try_load().unwrap_or_default(),
    };
    debug!("Using {:?}", settings.config);

    if simulate {
        info!("Simulating the shield");
        let pins = ShieldPins::default();
        let address = Mcp23017::<SimulatedMcp23017>::BASE_ADDRESS | (selector & 0b111);
        let mut sim = SimulatedMcp23017::new(address);
        sim.attach_lcd(pins.rs, pins.enable, &pins.data);

        let expander = Mcp23017::new(sim, selector);
        run(&expander, RecordingDelay::new(), &settings, Some(SIMULATED_POLLS), |expander, poll| {
            // Hold one button per poll, in turn
            let mut sim = expander.bus_mut();
            for pin in pins.buttons {
                sim.release_external(pin);
            }
            sim.set_external(pins.buttons[poll % pins.buttons.len()], false);
        })?;

        let latched = expander.bus().lcd_latches().len();
        info!("Simulated display latched {} nibbles", latched);
    } else {
        let bus = RawI2cBus::new_mem(1).wrap_err("Cannot map the I2C controller")?;
        let expander = Mcp23017::new(bus, selector);
        run(&expander, StdDelay, &settings, None, |_, _| {})?;
    }

    Ok(())
}

/// Brings up the display and polls the buttons, `polls` times or forever.
fn run<B: I2cBus, D: DelayNs>(
    expander: &Mcp23017<B>,
    delay: D,
    settings: &Settings,
    polls: Option<usize>,
    mut before_poll: impl FnMut(&Mcp23017<B>, usize),
) -> eyre::Result<()> {
    info!("LCD @ {:?}, {}x{}", expander, settings.columns, settings.lines);

    let mut lcd = CharLcd::shield(expander, delay)?;
    lcd.init(settings.columns, settings.lines, Font::Dots5x8)
        .wrap_err("Cannot initialize the display")?;
    lcd.set_backlight(Backlight(settings.config.backlight))?;

    lcd.create_char(0, &BELL)?;
    lcd.print(&settings.config.greeting)?;
    lcd.set_cursor(0, 1)?;
    lcd.write(0)?;
    lcd.print(" Press a button")?;

    let mut last = Buttons::default();
    let mut poll = 0;
    while polls.is_none_or(|polls| poll < polls) {
        before_poll(expander, poll);
        poll += 1;

        let buttons = lcd.read_buttons()?;
        if buttons != last {
            debug!("Buttons: {:05b}", buttons.bits());
            if let Some(&(_, color)) = BUTTON_COLORS.iter().find(|(button, _)| buttons.is_pressed(*button)) {
                info!("Backlight {:?}", color);
                lcd.set_backlight(color)?;
            }
            last = buttons;
        }

        if polls.is_none() {
            sleep(POLL_INTERVAL);
        }
    }

    lcd.clear()?;
    Ok(())
}
