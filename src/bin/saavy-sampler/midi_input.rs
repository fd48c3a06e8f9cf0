//! MIDI input through midir. The midir callback thread only pushes raw bytes
//! into the engine's event queue.

use color_eyre::eyre::{eyre, Result as EyreResult};
use midir::{MidiInput, MidiInputConnection};

use saavy_sampler::synth::message::MidiSender;

const CLIENT_NAME: &str = "saavy-sampler";

pub fn list_ports() -> EyreResult<()> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|err| eyre!("MIDI unavailable: {err}"))?;
    println!("Available MIDI inputs:");
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            println!("- {name}");
        }
    }
    Ok(())
}

/// Connect the first input whose name contains `filter` (any input when no
/// filter is given). No ports is not an error: the sampler still plays from
/// other sources.
pub fn connect(
    filter: Option<&str>,
    mut sender: MidiSender,
) -> EyreResult<Option<MidiInputConnection<()>>> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|err| eyre!("MIDI unavailable: {err}"))?;

    let port = midi_in.ports().into_iter().find(|port| {
        let name = midi_in.port_name(port).unwrap_or_default();
        filter.map_or(true, |filter| name.contains(filter))
    });
    let Some(port) = port else {
        match filter {
            Some(filter) => log::warn!("no MIDI input matches '{filter}'"),
            None => log::info!("no MIDI input found"),
        }
        return Ok(None);
    };

    let name = midi_in.port_name(&port).unwrap_or_default();
    let connection = midi_in
        .connect(
            &port,
            "saavy-sampler-input",
            move |_stamp, message, _| {
                sender.send(message);
            },
            (),
        )
        .map_err(|err| eyre!("could not open MIDI input {name}: {err}"))?;

    log::info!("opened MIDI input: {name}");
    Ok(Some(connection))
}
