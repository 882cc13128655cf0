//! Deterministic phase payloads used when every LLM attempt failed.
//!
//! Text is assembled from template sentences sized against the configured
//! bands, and each payload is checked with the same rules as LLM output
//! before it is returned. A payload that cannot satisfy the rules (only
//! possible with unusual bounds) is an error, never a silent downgrade.

use crate::error::{EnrichError, EnrichResult};
use crate::payload::{
    EditorialPayload, FaqEntry, LoadCondition, LoadTable, TechnicalPayload, VariantSpec,
};
use crate::record::{VehicleCategory, VehicleIdentity};
use crate::validation::{
    Band, EditorialBounds, EditorialRules, TechnicalBounds, TechnicalRules, TextUnit,
};
use std::collections::BTreeSet;

const SUMMARY: &[&str] = &[
    "Guia de calibragem do {name} ({label}): onde encontrar a etiqueta de pressão, como calibrar com os pneus frios e quando ajustar para viagens com carga.",
    "Inclui cuidados de manutenção que prolongam a vida útil dos pneus e ajudam a economizar combustível no dia a dia.",
    "Confira também as dúvidas mais comuns de quem roda com este modelo.",
];

const INTRODUCTION: &[&str] = &[
    "Manter a pressão correta dos pneus do {name} é um dos cuidados mais simples e importantes para quem quer rodar com segurança.",
    "Pneus calibrados garantem frenagens mais curtas, respostas previsíveis nas curvas e desgaste uniforme da banda de rodagem ao longo do tempo.",
    "Neste guia reunimos as orientações essenciais para calibrar corretamente este modelo de {label}, tanto no uso urbano quanto em viagens mais longas.",
    "A recomendação oficial da {make} considera o peso do veículo, a medida dos pneus e as condições de carga previstas pelo projeto.",
    "Por isso, vale sempre conferir a etiqueta de calibragem e o manual do proprietário antes de ajustar qualquer valor no posto.",
    "A verificação deve ser feita com os pneus frios, ou seja, antes de rodar ou depois de algumas horas com o veículo parado.",
    "Calibrar com os pneus quentes gera leituras mais altas e pode levar o motorista a deixar a pressão abaixo do ideal.",
    "Pressão baixa aumenta o consumo de combustível, esquenta a estrutura do pneu e reduz a estabilidade em manobras de emergência.",
    "Já a pressão excessiva diminui a área de contato com o solo, prejudica a aderência e deixa a rodagem mais desconfortável.",
    "Quando o {model} roda carregado, com mais ocupantes ou bagagem, os valores recomendados mudam e precisam ser ajustados antes da partida.",
    "Também explicamos como interpretar as medidas dos pneus e por que cada versão pode ter uma recomendação diferente.",
    "Ao final, respondemos às dúvidas mais frequentes de quem convive com este modelo no dia a dia.",
];

const CLOSING: &[&str] = &[
    "Cuidar da calibragem do {name} leva poucos minutos e traz benefícios diretos para a segurança de todos a bordo.",
    "O ideal é verificar a pressão pelo menos a cada quinze dias e sempre antes de viagens longas ou com carga.",
    "Não esqueça do estepe, quando houver, que também perde pressão com o tempo e precisa estar pronto para uso.",
    "Use calibradores confiáveis e, em caso de dúvida, confirme os valores na etiqueta do veículo ou no manual do proprietário.",
    "Observe ainda sinais de desgaste irregular, bolhas ou cortes na lateral, que indicam a necessidade de avaliação profissional.",
    "Alinhamento e balanceamento em dia complementam a calibragem e ajudam os pneus a durar muito mais.",
    "Com esses hábitos, o {model} mantém o comportamento previsto pela {make} e roda de forma mais econômica.",
    "Boa viagem e até a próxima revisão.",
];

struct FaqTemplate {
    question: &'static str,
    answer: &'static [&'static str],
}

const FAQ: &[FaqTemplate] = &[
    FaqTemplate {
        question: "Onde fica a etiqueta de calibragem do {name}?",
        answer: &[
            "Nos modelos da {make}, a etiqueta costuma ficar na coluna da porta, na tampa do tanque, na balança traseira ou no manual do proprietário.",
            "Ela traz os valores recomendados para uso normal e com carga.",
            "Se a etiqueta estiver ilegível, consulte o manual ou uma concessionária autorizada.",
        ],
    },
    FaqTemplate {
        question: "Devo calibrar os pneus do {model} frios ou quentes?",
        answer: &[
            "Sempre com os pneus frios, antes de rodar ou depois de o veículo ficar parado por algumas horas.",
            "Com os pneus quentes, o ar dilatado eleva a leitura do calibrador.",
            "Se precisar calibrar depois de rodar, não retire ar para compensar a diferença.",
        ],
    },
    FaqTemplate {
        question: "A pressão muda quando o {model} está carregado?",
        answer: &[
            "Sim. Com mais ocupantes ou bagagem, a recomendação costuma ser mais alta, principalmente no eixo traseiro.",
            "Consulte a tabela de carga deste guia ou a etiqueta do veículo.",
            "Depois de descarregar, volte aos valores de uso normal.",
        ],
    },
    FaqTemplate {
        question: "Com que frequência devo verificar a calibragem?",
        answer: &[
            "O recomendado é verificar a cada quinze dias e antes de toda viagem longa.",
            "Os pneus perdem pressão naturalmente, mesmo sem furos, e variações de temperatura aceleram essa perda.",
            "Inclua o estepe na rotina, quando o veículo tiver um.",
        ],
    },
    FaqTemplate {
        question: "Pneus com nitrogênio dispensam a calibragem?",
        answer: &[
            "Não. O nitrogênio perde pressão de forma mais lenta, mas a verificação periódica continua necessária.",
            "Se não houver nitrogênio disponível, é possível completar com ar comum sem prejuízo.",
            "O importante é manter a pressão recomendada pela fabricante.",
        ],
    },
    FaqTemplate {
        question: "O que acontece se eu rodar com pressão baixa?",
        answer: &[
            "Pressão baixa aumenta o consumo de combustível, esquenta a estrutura do pneu e acelera o desgaste nos ombros da banda.",
            "Também piora a estabilidade em curvas e frenagens.",
            "Em casos extremos, pode causar danos internos irreversíveis.",
        ],
    },
];

/// Tire data and trim suffixes for one category.
struct Profile {
    tire_size: &'static str,
    /// Front, rear, front loaded, rear loaded; PSI.
    pressures: [i64; 4],
    suffixes: &'static [&'static str],
    load_situation: &'static str,
}

const MOTORCYCLE_SUFFIXES: &[&str] = &["Freio a Disco", "Freio CBS", "Freio ABS", "Edição Especial"];

fn profile(category: VehicleCategory) -> Profile {
    match category {
        VehicleCategory::Car => Profile {
            tire_size: "185/65 R15",
            pressures: [30, 30, 33, 36],
            suffixes: &["1.0 Manual", "1.0 Automático", "1.0 Turbo Automático", "1.6 Automático", "Turbo Esportivo"],
            load_situation: "Cinco ocupantes com bagagem",
        },
        VehicleCategory::CarElectric => Profile {
            tire_size: "205/55 R16",
            pressures: [36, 36, 38, 40],
            suffixes: &["EV Autonomia Estendida", "EV Tração Dupla", "EV Urbano", "EV Performance"],
            load_situation: "Cinco ocupantes com bagagem",
        },
        VehicleCategory::CarHybrid => Profile {
            tire_size: "215/55 R17",
            pressures: [35, 35, 36, 38],
            suffixes: &["Híbrido Flex", "Híbrido Plug-in", "Híbrido Automático", "Híbrido AWD"],
            load_situation: "Cinco ocupantes com bagagem",
        },
        VehicleCategory::Motorcycle | VehicleCategory::MotorcycleStreet => Profile {
            tire_size: "80/100-18 (D) e 90/90-18 (T)",
            pressures: [25, 29, 25, 33],
            suffixes: MOTORCYCLE_SUFFIXES,
            load_situation: "Com garupa e bagagem",
        },
        VehicleCategory::MotorcycleScooter => Profile {
            tire_size: "90/90-14 (D) e 100/90-14 (T)",
            pressures: [29, 33, 29, 36],
            suffixes: &["125 Urbana", "150 Conectada", "160 ABS", "Edição Especial"],
            load_situation: "Com garupa e bagagem",
        },
        VehicleCategory::MotorcycleSport => Profile {
            tire_size: "120/70 ZR17 (D) e 180/55 ZR17 (T)",
            pressures: [36, 42, 36, 42],
            suffixes: &["ABS Esportiva", "Quickshifter", "Race Edition", "Edição Especial"],
            load_situation: "Com garupa",
        },
        VehicleCategory::MotorcycleTrail => Profile {
            tire_size: "90/90-21 (D) e 120/80-18 (T)",
            pressures: [22, 26, 22, 29],
            suffixes: &["Rally ABS", "Adventure", "Freio CBS", "Edição Especial"],
            load_situation: "Com garupa e bagagem",
        },
        VehicleCategory::Pickup => Profile {
            tire_size: "265/60 R18",
            pressures: [35, 35, 38, 44],
            suffixes: &["Cabine Simples 4x2", "Cabine Dupla 4x2", "Cabine Dupla 4x4", "Diesel 4x4 Automática"],
            load_situation: "Caçamba carregada",
        },
        VehicleCategory::Truck => Profile {
            tire_size: "275/80 R22.5",
            pressures: [58, 60, 60, 60],
            suffixes: &["Eixo Simples", "Eixo Duplo", "Chassi Longo", "Cavalo Mecânico"],
            load_situation: "Carga máxima homologada",
        },
    }
}

#[derive(Debug, Clone)]
pub struct FallbackSynthesizer {
    editorial: EditorialRules,
    technical: TechnicalRules,
}

impl FallbackSynthesizer {
    pub fn new(editorial: EditorialBounds, technical: TechnicalBounds) -> Self {
        Self {
            editorial: EditorialRules::new(editorial),
            technical: TechnicalRules::new(technical),
        }
    }

    pub fn editorial(&self, vehicle: &VehicleIdentity) -> EnrichResult<EditorialPayload> {
        let bounds = self.editorial.bounds();
        let vars = Vars::new(vehicle);

        let faq_count = bounds.faq_count.midpoint().min(FAQ.len());
        let payload = EditorialPayload {
            short_summary: compose(&vars.fill_all(SUMMARY), bounds.short_summary.strict, TextUnit::Chars),
            introduction: compose(&vars.fill_all(INTRODUCTION), bounds.introduction.strict, TextUnit::Words),
            closing: compose(&vars.fill_all(CLOSING), bounds.closing.strict, TextUnit::Words),
            faq: FAQ
                .iter()
                .take(faq_count)
                .map(|template| FaqEntry {
                    question: vars.fill(template.question),
                    answer: compose(
                        &vars.fill_all(template.answer),
                        bounds.faq_answer_words,
                        TextUnit::Words,
                    ),
                })
                .collect(),
        };

        // Strictest attempt: no soft acceptance.
        self.editorial.validate(&payload, u32::MAX).into_result()?;
        Ok(payload)
    }

    pub fn technical(&self, vehicle: &VehicleIdentity) -> EnrichResult<TechnicalPayload> {
        let bounds = self.technical.bounds();
        let profile = profile(vehicle.category);
        let names = self.variant_names(vehicle, &profile)?;
        let [front, rear, front_loaded, rear_loaded] =
            profile.pressures.map(|psi| clamp_psi(psi, bounds.pressure_psi));

        let payload = TechnicalPayload {
            variant_specs: names
                .iter()
                .map(|name| VariantSpec {
                    variant_name: name.clone(),
                    tire_size: profile.tire_size.to_string(),
                    front_normal: Some(front),
                    rear_normal: Some(rear),
                    front_loaded: Some(front_loaded),
                    rear_loaded: Some(rear_loaded),
                })
                .collect(),
            load_table: Some(LoadTable {
                title: format!(
                    "Pressão dos pneus conforme a carga - {}",
                    vehicle.display_name()
                ),
                conditions: names
                    .iter()
                    .map(|name| LoadCondition {
                        variant_name: name.clone(),
                        situation: profile.load_situation.to_string(),
                        front: Some(front_loaded),
                        rear: Some(rear_loaded),
                    })
                    .collect(),
            }),
        };

        self.technical.validate(&payload, u32::MAX).into_result()?;
        Ok(payload)
    }

    /// `"{model} {suffix}"`, or the bare suffix when the model name itself
    /// trips a rule.
    fn variant_names(
        &self,
        vehicle: &VehicleIdentity,
        profile: &Profile,
    ) -> EnrichResult<Vec<String>> {
        let bounds = self.technical.bounds();
        let wanted = bounds.variant_count.min.max(1);
        let acceptable = |name: &str| {
            name.chars().count() >= bounds.min_variant_name_chars
                && self.technical.forbidden_term_in(name).is_none()
        };

        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        for &suffix in profile.suffixes {
            let prefixed = format!("{} {suffix}", vehicle.model.trim());
            let name = if acceptable(prefixed.as_str()) {
                prefixed
            } else if acceptable(suffix) {
                suffix.to_string()
            } else {
                continue;
            };
            if seen.insert(name.to_lowercase()) {
                names.push(name);
            }
            if names.len() == wanted {
                return Ok(names);
            }
        }
        Err(EnrichError::config(format!(
            "fallback found only {} acceptable variant names for {} (need {wanted})",
            names.len(),
            vehicle.category
        )))
    }
}

fn clamp_psi(psi: i64, band: Band) -> i64 {
    let min = i64::try_from(band.min).unwrap_or(i64::MAX);
    let max = i64::try_from(band.max).unwrap_or(i64::MAX);
    psi.clamp(min, max.max(min))
}

struct Vars {
    name: String,
    make: String,
    model: String,
    label: &'static str,
}

impl Vars {
    fn new(vehicle: &VehicleIdentity) -> Self {
        Self {
            name: vehicle.display_name(),
            make: vehicle.make.trim().to_string(),
            model: vehicle.model.trim().to_string(),
            label: vehicle.category.label(),
        }
    }

    fn fill(&self, template: &str) -> String {
        template
            .replace("{name}", &self.name)
            .replace("{make}", &self.make)
            .replace("{model}", &self.model)
            .replace("{label}", self.label)
    }

    fn fill_all(&self, templates: &[&str]) -> Vec<String> {
        templates.iter().map(|t| self.fill(t)).collect()
    }
}

/// Join whole sentences up to the band midpoint, then top up word by word
/// if the text is still under the minimum.
fn compose(sentences: &[String], band: Band, unit: TextUnit) -> String {
    if sentences.is_empty() {
        return String::new();
    }
    let target = band.midpoint();
    let mut text = String::new();
    let mut used = 0usize;

    // Sentences may repeat when the band outgrows the pool.
    let max_sentences = sentences.len() * 8;
    while used < max_sentences {
        let candidate = join(&text, &sentences[used % sentences.len()]);
        if unit.measure(&candidate) > target {
            break;
        }
        text = candidate;
        used += 1;
    }

    if unit.measure(&text) < band.min {
        let words = sentences
            .iter()
            .cycle()
            .skip(used % sentences.len())
            .take(max_sentences)
            .flat_map(|sentence| sentence.split_whitespace());
        for word in words {
            if unit.measure(&text) >= band.min {
                break;
            }
            let candidate = join(&text, word);
            if unit.measure(&candidate) > band.max {
                break;
            }
            text = candidate;
        }
        let closed = format!("{}.", text.trim_end_matches([',', ';', ':', '.']));
        if unit.measure(&closed) <= band.max && unit.measure(&closed) >= band.min {
            text = closed;
        }
    }
    text
}

fn join(text: &str, next: &str) -> String {
    if text.is_empty() {
        next.to_string()
    } else {
        format!("{text} {next}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::TextBounds;

    fn vehicle(category: VehicleCategory) -> VehicleIdentity {
        VehicleIdentity {
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            year: 2024,
            category,
        }
    }

    fn synthesizer() -> FallbackSynthesizer {
        FallbackSynthesizer::new(EditorialBounds::default(), TechnicalBounds::default())
    }

    #[test]
    fn editorial_fallback_passes_rules_for_every_category() {
        let rules = EditorialRules::new(EditorialBounds::default());
        for category in VehicleCategory::ALL {
            let payload = synthesizer()
                .editorial(&vehicle(category))
                .unwrap_or_else(|err| panic!("{category}: {err}"));
            for attempt in [1, 2, 3] {
                let report = rules.validate(&payload, attempt);
                assert!(report.is_valid(), "{category}: {:?}", report.violations);
                assert!(report.warnings.is_empty(), "{category}: {:?}", report.warnings);
            }
        }
    }

    #[test]
    fn technical_fallback_passes_rules_for_every_category() {
        let rules = TechnicalRules::new(TechnicalBounds::default());
        for category in VehicleCategory::ALL {
            let payload = synthesizer()
                .technical(&vehicle(category))
                .unwrap_or_else(|err| panic!("{category}: {err}"));
            let report = rules.validate(&payload, 1);
            assert!(report.is_valid(), "{category}: {:?}", report.violations);
        }
    }

    #[test]
    fn fallback_is_deterministic() {
        let v = vehicle(VehicleCategory::Pickup);
        assert_eq!(
            synthesizer().editorial(&v).unwrap(),
            synthesizer().editorial(&v).unwrap()
        );
        assert_eq!(
            synthesizer().technical(&v).unwrap(),
            synthesizer().technical(&v).unwrap()
        );
    }

    #[test]
    fn forbidden_model_name_falls_back_to_bare_suffix() {
        let mut v = vehicle(VehicleCategory::Car);
        v.model = "Top".to_string();
        let payload = synthesizer().technical(&v).expect("technical");
        assert_eq!(payload.variant_specs[0].variant_name, "1.0 Manual");
    }

    #[test]
    fn follows_recalibrated_bounds() {
        let mut editorial = EditorialBounds::default();
        editorial.introduction = TextBounds::new(Band::new(300, 360), Band::new(280, 400));
        editorial.short_summary = TextBounds::new(Band::new(60, 90), Band::new(50, 100));
        let mut technical = TechnicalBounds::default();
        technical.variant_count = Band::new(4, 5);
        technical.pressure_psi = Band::new(20, 34);

        let synth = FallbackSynthesizer::new(editorial.clone(), technical.clone());
        let v = vehicle(VehicleCategory::Truck);
        let payload = synth.editorial(&v).expect("editorial");
        assert!(EditorialRules::new(editorial).validate(&payload, 3).is_valid());
        let payload = synth.technical(&v).expect("technical");
        assert_eq!(payload.variant_specs.len(), 4);
        assert_eq!(payload.variant_specs[0].front_normal, Some(34));
        assert!(TechnicalRules::new(technical).validate(&payload, 3).is_valid());
    }

    #[test]
    fn impossible_bounds_are_an_error() {
        let mut technical = TechnicalBounds::default();
        technical.variant_count = Band::new(9, 9);
        let synth = FallbackSynthesizer::new(EditorialBounds::default(), technical);
        assert!(synth.technical(&vehicle(VehicleCategory::Car)).is_err());
    }
}
