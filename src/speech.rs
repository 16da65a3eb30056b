//! Spanish rendering of clock times.
//!
//! Pure text functions; the announcer decides when to speak them. Hours are
//! spoken on a 12-hour clock with the grammar of es-MX: "Son las cinco" for
//! plural hours, "Es la una" for one o'clock.

use chrono::{NaiveTime, Timelike};

/// Minute after which the time is phrased as "minutes remaining".
const HALF_HOUR: u32 = 30;

/// "Son las" / "Es la" (with article) or "Son" / "Es" (without).
pub fn hour_prefix(hour12: u32, with_article: bool) -> &'static str {
    match (hour12 > 1, with_article) {
        (true, true) => "Son las",
        (false, true) => "Es la",
        (true, false) => "Son",
        (false, false) => "Es",
    }
}

/// Plural marker for "la(s)".
pub fn hour_suffix(hour12: u32) -> &'static str {
    if hour12 > 1 {
        "s"
    } else {
        ""
    }
}

/// Hour one is spoken as "una", never as a digit.
pub fn hour_word(hour12: u32) -> String {
    if hour12 == 1 {
        "una".to_string()
    } else {
        hour12.to_string()
    }
}

fn to_hour12(hour: u32) -> u32 {
    if hour > 12 {
        hour - 12
    } else {
        hour
    }
}

fn unit(n: u32, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("un {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Minutes and seconds past the hour, optionally down to milliseconds.
fn minute_detail(now: NaiveTime, with_milliseconds: bool) -> String {
    let minutes = unit(now.minute(), "minuto", "minutos");
    let seconds = unit(now.second(), "segundo", "segundos");
    if with_milliseconds {
        let millis = unit(now.nanosecond() / 1_000_000, "milisegundo", "milisegundos");
        format!("{minutes}, {seconds}, {millis}")
    } else {
        format!("{minutes} y {seconds}")
    }
}

/// "Faltan N minutos para la(s) H" — used past the half hour, counting down
/// to the next hour instead of up from the current one.
pub fn minutes_remaining(now: NaiveTime, say_milliseconds: bool) -> String {
    let seconds_txt = if say_milliseconds {
        format!(
            "{} milisegundos, {} segundos y, ",
            1000 - now.nanosecond() / 1_000_000,
            60 - now.second()
        )
    } else {
        String::new()
    };

    let next_hour12 = if now.hour() + 1 > 12 {
        now.hour() - 11
    } else {
        now.hour() + 1
    };

    if say_milliseconds {
        format!(
            "Faltan {seconds_txt}{} minutos para la{} {}",
            60 - now.minute(),
            hour_suffix(next_hour12),
            hour_word(next_hour12)
        )
    } else {
        format!(
            "Faltan {} para la{} {}",
            60 - now.minute(),
            hour_suffix(next_hour12),
            hour_word(next_hour12)
        )
    }
}

/// Current time for the on-demand announcement, with a time-of-day segment
/// word ("de la mañana", "del medio día", "de la tarde"/"noche").
pub fn current_time(now: NaiveTime, say_milliseconds: bool) -> String {
    if now.minute() > HALF_HOUR {
        return minutes_remaining(now, say_milliseconds);
    }

    let hour = now.hour();
    let hour12 = to_hour12(hour);
    let lead = format!("{} {}", hour_prefix(hour12, true), hour_word(hour12));
    let detail = minute_detail(now, say_milliseconds);

    match hour {
        0 => "doce de la noche".to_string(),
        12 => format!("doce del medio día, {detail}"),
        h if h >= 13 => {
            let segment = if h < 20 { "tarde" } else { "noche" };
            format!("{lead} de la {segment}, {detail}")
        }
        _ => format!("{lead} de la mañana, {detail}"),
    }
}

/// The two on-the-hour utterances: the long form with its time-of-day
/// segment, then the short "La(s) N en punto" confirmation.
pub fn on_the_hour(now: NaiveTime) -> (String, String) {
    let hour = now.hour();
    let hour12 = to_hour12(hour);

    let segment = if hour > 0 && hour < 4 {
        "de la madrugada"
    } else if hour < 11 {
        "de la mañana"
    } else if hour < 12 {
        "del día"
    } else if hour == 12 {
        "del medio día"
    } else if hour < 19 {
        "de la tarde"
    } else {
        "de la noche"
    };

    let first = format!(
        "{} {} {}",
        hour_prefix(hour12, true),
        hour_word(hour12),
        segment
    );
    let second = format!("La{} {} en punto", hour_suffix(hour12), hour_word(hour12));
    (first, second)
}

pub fn quarter_past(now: NaiveTime) -> String {
    let hour12 = to_hour12(now.hour());
    format!("{} {} y cuarto", hour_prefix(hour12, true), hour_word(hour12))
}

pub fn half_past(now: NaiveTime) -> String {
    let hour12 = to_hour12(now.hour());
    format!("{} {} y media", hour_prefix(hour12, false), hour_word(hour12))
}

/// Quarter to the *next* hour: at 4:45 this says "Son cuarto para las 5".
pub fn quarter_to(now: NaiveTime) -> String {
    let hour12 = if now.hour() + 1 < 13 {
        now.hour() + 1
    } else {
        now.hour() - 11
    };
    format!(
        "{} cuarto para la{} {}",
        hour_prefix(hour12, false),
        hour_suffix(hour12),
        hour_word(hour12)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    #[test]
    fn one_oclock_is_singular() {
        let (first, second) = on_the_hour(at(1, 0, 0));
        assert_eq!(first, "Es la una de la madrugada");
        assert_eq!(second, "La una en punto");
    }

    #[test]
    fn one_pm_is_also_singular() {
        assert_eq!(quarter_past(at(13, 15, 0)), "Es la una y cuarto");
    }

    #[test]
    fn plural_hours_use_son_las() {
        let (first, second) = on_the_hour(at(17, 0, 0));
        assert_eq!(first, "Son las 5 de la tarde");
        assert_eq!(second, "Las 5 en punto");
    }

    #[test]
    fn half_past_drops_the_article() {
        assert_eq!(half_past(at(9, 30, 0)), "Son 9 y media");
        assert_eq!(half_past(at(1, 30, 0)), "Es una y media");
    }

    #[test]
    fn quarter_to_names_the_next_hour() {
        assert_eq!(quarter_to(at(4, 45, 0)), "Son cuarto para las 5");
        assert_eq!(quarter_to(at(12, 45, 0)), "Es cuarto para la una");
    }

    #[test]
    fn past_the_half_hour_counts_down() {
        let txt = current_time(at(10, 40, 0), false);
        assert!(txt.starts_with("Faltan 20"), "got: {txt}");
        assert!(txt.ends_with("para las 11"), "got: {txt}");
    }

    #[test]
    fn before_the_half_hour_counts_up() {
        let txt = current_time(at(10, 20, 5), false);
        assert_eq!(txt, "Son las 10 de la mañana, 20 minutos y 5 segundos");
    }

    #[test]
    fn noon_and_midnight_are_spelled_out() {
        assert!(current_time(at(12, 3, 0), false).starts_with("doce del medio día"));
        assert_eq!(current_time(at(0, 10, 0), false), "doce de la noche");
    }

    #[test]
    fn milliseconds_are_included_on_request() {
        let txt = current_time(at(10, 20, 5), true);
        assert!(txt.contains("milisegundos"), "got: {txt}");
    }
}
