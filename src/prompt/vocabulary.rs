//! Real-market trim-name conventions, keyed by make and optionally model.
//!
//! Hints only steer the model; names are still checked against the
//! forbidden-term list after parsing.

use crate::record::VehicleIdentity;

struct Entry {
    make: &'static str,
    /// `None` applies to every model of the make.
    model: Option<&'static str>,
    motorcycle: bool,
    trims: &'static [&'static str],
}

const ENTRIES: &[Entry] = &[
    Entry {
        make: "toyota",
        model: Some("hilux"),
        motorcycle: false,
        trims: &["SR 2.8 Diesel", "SRV 2.8 Diesel", "SRX Plus", "GR-Sport", "Conquest"],
    },
    Entry {
        make: "toyota",
        model: Some("corolla"),
        motorcycle: false,
        trims: &["GLi 2.0", "XEi 2.0", "Altis Hybrid", "Altis Premium Hybrid", "GR-Sport"],
    },
    Entry {
        make: "toyota",
        model: None,
        motorcycle: false,
        trims: &["XS", "XLS", "XRE", "XEi", "GR-Sport"],
    },
    Entry {
        make: "honda",
        model: Some("cg 160"),
        motorcycle: true,
        trims: &["Start", "Fan", "Titan", "Cargo"],
    },
    Entry {
        make: "honda",
        model: None,
        motorcycle: true,
        trims: &["CBS", "ABS", "Adventure", "Rally"],
    },
    Entry {
        make: "honda",
        model: None,
        motorcycle: false,
        trims: &["LX", "EX", "EXL", "Touring", "Advance"],
    },
    Entry {
        make: "yamaha",
        model: None,
        motorcycle: true,
        trims: &["Factor ED", "Fazer FZ15", "Connected ABS", "Lander ABS"],
    },
    Entry {
        make: "chevrolet",
        model: None,
        motorcycle: false,
        trims: &["LT", "LTZ", "Premier", "RS", "High Country", "Midnight"],
    },
    Entry {
        make: "volkswagen",
        model: None,
        motorcycle: false,
        trims: &["Comfortline", "Highline", "Sense", "GTS", "Extreme"],
    },
    Entry {
        make: "fiat",
        model: None,
        motorcycle: false,
        trims: &["Drive", "Trekking", "Volcano", "Ranch", "Endurance", "Freedom", "Ultra"],
    },
    Entry {
        make: "hyundai",
        model: None,
        motorcycle: false,
        trims: &["Sense", "Comfort", "Limited", "Platinum", "N Line"],
    },
    Entry {
        make: "renault",
        model: None,
        motorcycle: false,
        trims: &["Zen", "Intense", "Iconic", "Outsider"],
    },
    Entry {
        make: "ford",
        model: None,
        motorcycle: false,
        trims: &["XLS", "XLT", "Limited", "Storm", "Raptor"],
    },
    Entry {
        make: "jeep",
        model: None,
        motorcycle: false,
        trims: &["Sport", "Longitude", "Limited", "Trailhawk", "Overland"],
    },
    Entry {
        make: "nissan",
        model: None,
        motorcycle: false,
        trims: &["Sense", "Advance", "Exclusive", "Platinum", "XE", "LE"],
    },
];

/// Trim-name hints for a vehicle; a model match wins over a make match.
pub fn trim_hints(vehicle: &VehicleIdentity) -> &'static [&'static str] {
    let make = vehicle.make.trim().to_lowercase();
    let make = make.as_str();
    let model = vehicle.model.trim().to_lowercase();
    let motorcycle = vehicle.category.is_motorcycle();

    let candidates = || {
        ENTRIES
            .iter()
            .filter(move |e| e.make == make && e.motorcycle == motorcycle)
    };
    candidates()
        .find(|e| e.model.is_some_and(|m| model.starts_with(m)))
        .or_else(|| candidates().find(|e| e.model.is_none()))
        .map(|e| e.trims)
        .unwrap_or(&[])
}

/// The vocabulary block of the technical prompt.
pub fn render(vehicle: &VehicleIdentity) -> String {
    let hints = trim_hints(vehicle);
    if hints.is_empty() {
        return "- Use os nomes de versão oficiais do fabricante no Brasil, acompanhados da \
                motorização ou do pacote (ex.: \"LTZ 1.0 Turbo\")."
            .to_string();
    }
    format!(
        "- Convenções reais de versão da {}: {}.\n- Combine o nome da versão com a motorização ou o pacote (ex.: \"{} {}\").",
        vehicle.make.trim(),
        hints.join(", "),
        hints[0],
        example_suffix(vehicle)
    )
}

fn example_suffix(vehicle: &VehicleIdentity) -> &'static str {
    if vehicle.category.is_motorcycle() {
        "160 ABS"
    } else {
        "1.0 Turbo"
    }
}
