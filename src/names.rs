// 🪪 Synthetic Names - Deterministic Portuguese name generation
// Pure functions of an integer seed; no hidden random state.

/// Gender tag attached to generated guardian/student names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
        }
    }
}

const FEMALE_FIRST: &[&str] = &[
    "Ana", "Bianca", "Claudia", "Daniela", "Eduarda", "Gabriela", "Heloisa", "Isabela", "Janaina",
    "Karen", "Larissa", "Natalia", "Olivia", "Patricia", "Rafaela", "Silvia", "Sofia", "Talita",
    "Vitória",
];

const MALE_FIRST: &[&str] = &[
    "Alex", "Bruno", "Caio", "Diego", "Eduardo", "Felipe", "Fernando", "Henrique", "Igor", "João",
    "Kleber", "Marcelo", "Miguel", "Natan", "Otavio", "Paulo", "Renato", "Tiago", "Valter",
];

const LAST: &[&str] = &[
    "Lima", "Nunes", "Faria", "Prado", "Silva", "Martins", "Carvalho", "Monteiro", "Teixeira",
    "Barbosa", "Souza", "Costa", "Oliveira", "Pereira", "Almeida",
];

fn pick<'a>(pool: &'a [&'a str], seed: u64) -> &'a str {
    pool[(seed as usize) % pool.len()]
}

fn seeded_name(seed: u64, gender: Gender) -> (String, String) {
    let first = match gender {
        Gender::Female => pick(FEMALE_FIRST, seed),
        Gender::Male => pick(MALE_FIRST, seed),
    };
    // Different stride so first/last pairs do not cycle in lockstep
    let last = pick(LAST, seed.wrapping_mul(7).wrapping_add(3));
    (format!("{} {}", first, last), first.to_string())
}

/// Guardian full name, preferred (first) name and gender for a seed.
pub fn guardian_name(seed: u64) -> (String, String, Gender) {
    let gender = if seed % 2 == 0 { Gender::Female } else { Gender::Male };
    let (full, preferred) = seeded_name(1_000_000 + seed, gender);
    (full, preferred, gender)
}

/// Student full name, preferred (first) name and gender for a seed.
pub fn student_name(seed: u64) -> (String, String, Gender) {
    let gender = if seed % 2 == 1 { Gender::Female } else { Gender::Male };
    let (full, preferred) = seeded_name(2_000_000 + seed, gender);
    (full, preferred, gender)
}

/// Volunteer full name for a seed.
pub fn volunteer_name(seed: u64) -> String {
    let gender = if seed % 3 == 0 { Gender::Male } else { Gender::Female };
    let (full, _) = seeded_name(3_000_000 + seed, gender);
    full
}

// ============================================================================
// TESTS
// ============================================================================
