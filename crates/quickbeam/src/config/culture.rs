//! Culture tables used by text and date formatting
//!
//! Named date and time patterns are written in the formula format-token
//! alphabet (`m`, `d`, `yyyy`, `AM/PM`, ...), so the same engine that
//! handles user-supplied formats also expands them.

/// Formatting conventions of one culture.
#[derive(Debug, PartialEq, Eq)]
pub struct Culture {
    /// BCP-47 name, empty for the invariant culture
    pub name: &'static str,
    /// Decimal separator
    pub decimal_separator: char,
    /// Thousands separator
    pub group_separator: char,
    /// Full month names, January first
    pub month_names: [&'static str; 12],
    /// Abbreviated month names
    pub month_abbreviations: [&'static str; 12],
    /// Full day names, Sunday first
    pub day_names: [&'static str; 7],
    /// Abbreviated day names
    pub day_abbreviations: [&'static str; 7],
    /// Morning designator
    pub am: &'static str,
    /// Afternoon designator
    pub pm: &'static str,
    /// `'shortdate'`
    pub short_date: &'static str,
    /// `'longdate'`
    pub long_date: &'static str,
    /// `'shorttime'`
    pub short_time: &'static str,
    /// `'longtime'`
    pub long_time: &'static str,
}

const ENGLISH_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const ENGLISH_MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const ENGLISH_DAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const ENGLISH_DAY_ABBR: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

static INVARIANT: Culture = Culture {
    name: "",
    decimal_separator: '.',
    group_separator: ',',
    month_names: ENGLISH_MONTHS,
    month_abbreviations: ENGLISH_MONTH_ABBR,
    day_names: ENGLISH_DAYS,
    day_abbreviations: ENGLISH_DAY_ABBR,
    am: "AM",
    pm: "PM",
    short_date: "mm/dd/yyyy",
    long_date: "dddd, dd mmmm yyyy",
    short_time: "hh:mm",
    long_time: "hh:mm:ss",
};

static EN_US: Culture = Culture {
    name: "en-US",
    decimal_separator: '.',
    group_separator: ',',
    month_names: ENGLISH_MONTHS,
    month_abbreviations: ENGLISH_MONTH_ABBR,
    day_names: ENGLISH_DAYS,
    day_abbreviations: ENGLISH_DAY_ABBR,
    am: "AM",
    pm: "PM",
    short_date: "m/d/yyyy",
    long_date: "dddd, mmmm d, yyyy",
    short_time: "h:mm AM/PM",
    long_time: "h:mm:ss AM/PM",
};

static EN_GB: Culture = Culture {
    name: "en-GB",
    decimal_separator: '.',
    group_separator: ',',
    month_names: ENGLISH_MONTHS,
    month_abbreviations: ENGLISH_MONTH_ABBR,
    day_names: ENGLISH_DAYS,
    day_abbreviations: ENGLISH_DAY_ABBR,
    am: "am",
    pm: "pm",
    short_date: "dd/mm/yyyy",
    long_date: "dddd, d mmmm yyyy",
    short_time: "hh:mm",
    long_time: "hh:mm:ss",
};

static FR_FR: Culture = Culture {
    name: "fr-FR",
    decimal_separator: ',',
    group_separator: '\u{202F}',
    month_names: [
        "janvier",
        "février",
        "mars",
        "avril",
        "mai",
        "juin",
        "juillet",
        "août",
        "septembre",
        "octobre",
        "novembre",
        "décembre",
    ],
    month_abbreviations: [
        "janv.", "févr.", "mars", "avr.", "mai", "juin", "juil.", "août", "sept.", "oct.",
        "nov.", "déc.",
    ],
    day_names: [
        "dimanche", "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi",
    ],
    day_abbreviations: ["dim.", "lun.", "mar.", "mer.", "jeu.", "ven.", "sam."],
    am: "AM",
    pm: "PM",
    short_date: "dd/mm/yyyy",
    long_date: "dddd d mmmm yyyy",
    short_time: "hh:mm",
    long_time: "hh:mm:ss",
};

static DE_DE: Culture = Culture {
    name: "de-DE",
    decimal_separator: ',',
    group_separator: '.',
    month_names: [
        "Januar",
        "Februar",
        "März",
        "April",
        "Mai",
        "Juni",
        "Juli",
        "August",
        "September",
        "Oktober",
        "November",
        "Dezember",
    ],
    month_abbreviations: [
        "Jan.", "Feb.", "März", "Apr.", "Mai", "Juni", "Juli", "Aug.", "Sept.", "Okt.", "Nov.",
        "Dez.",
    ],
    day_names: [
        "Sonntag",
        "Montag",
        "Dienstag",
        "Mittwoch",
        "Donnerstag",
        "Freitag",
        "Samstag",
    ],
    day_abbreviations: ["So.", "Mo.", "Di.", "Mi.", "Do.", "Fr.", "Sa."],
    am: "AM",
    pm: "PM",
    short_date: "dd.mm.yyyy",
    long_date: "dddd, d. mmmm yyyy",
    short_time: "hh:mm",
    long_time: "hh:mm:ss",
};

static ALL: [&Culture; 5] = [&INVARIANT, &EN_US, &EN_GB, &FR_FR, &DE_DE];

impl Culture {
    /// The invariant culture.
    pub fn invariant() -> &'static Culture {
        &INVARIANT
    }

    /// Culture by name, case-insensitive. A bare language code picks its
    /// primary region; the empty string is the invariant culture.
    pub fn lookup(name: &str) -> Option<&'static Culture> {
        let name = name.trim();
        let full = match name.to_ascii_lowercase().as_str() {
            "en" => "en-US",
            "fr" => "fr-FR",
            "de" => "de-DE",
            _ => name,
        };
        ALL.iter()
            .copied()
            .find(|c| c.name.eq_ignore_ascii_case(full))
    }

    /// Names of all supported cultures.
    pub fn supported() -> impl Iterator<Item = &'static str> {
        ALL.iter().map(|c| c.name)
    }
}
