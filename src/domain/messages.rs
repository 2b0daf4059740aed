use crate::domain::models::{EventName, Language};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText {
    pub title: String,
    pub body: String,
}

pub fn event_label(language: Language, event: EventName) -> &'static str {
    match (language, event) {
        (Language::Ar, EventName::Fajr) => "الفجر",
        (Language::Ar, EventName::Sunrise) => "الشروق",
        (Language::Ar, EventName::Dhuhr) => "الظهر",
        (Language::Ar, EventName::Asr) => "العصر",
        (Language::Ar, EventName::Maghrib) => "المغرب",
        (Language::Ar, EventName::Isha) => "العشاء",
        (Language::Ar, EventName::Sunset) => "الغروب",
        (Language::Ar, EventName::Imsak) => "الإمساك",
        (Language::Ar, EventName::Midnight) => "منتصف الليل",
        (Language::Fr, EventName::Sunrise) => "Lever",
        (Language::Fr, EventName::Sunset) => "Coucher",
        (Language::Fr, EventName::Midnight) => "Minuit",
        (_, event) => event.as_str(),
    }
}

pub fn adhan(language: Language, event: EventName) -> MessageText {
    let body = match language {
        Language::Ar => "حان الآن موعد الصلاة",
        Language::En => "It's time to pray",
        Language::Fr => "C'est l'heure de la prière",
    };
    MessageText {
        title: event_label(language, event).to_string(),
        body: body.to_string(),
    }
}

pub fn pre_reminder(language: Language, event: EventName) -> MessageText {
    let label = event_label(language, event);
    let (title, body) = match language {
        Language::Ar => (format!("اقترب موعد {label}"), "متبقي ١٥ دقيقة"),
        Language::En => (format!("Approaching {label}"), "15 minutes remaining"),
        Language::Fr => (format!("{label} approche"), "15 minutes restantes"),
    };
    MessageText {
        title,
        body: body.to_string(),
    }
}

pub fn morning_athkar(language: Language) -> MessageText {
    let (title, body) = match language {
        Language::Ar => ("أذكار الصباح", "حان وقت أذكار الصباح ☀️"),
        Language::En => ("Morning Athkar", "Time for Morning Athkar ☀️"),
        Language::Fr => ("Athkar du matin", "C'est l'heure des Athkar du matin ☀️"),
    };
    MessageText {
        title: title.to_string(),
        body: body.to_string(),
    }
}

pub fn evening_athkar(language: Language) -> MessageText {
    let (title, body) = match language {
        Language::Ar => ("أذكار المساء", "حان وقت أذكار المساء 🌙"),
        Language::En => ("Evening Athkar", "Time for Evening Athkar 🌙"),
        Language::Fr => ("Athkar du soir", "C'est l'heure des Athkar du soir 🌙"),
    };
    MessageText {
        title: title.to_string(),
        body: body.to_string(),
    }
}

pub fn notifications_enabled(language: Language) -> MessageText {
    let (title, body) = match language {
        Language::Ar => ("الإشعارات مفعلة", "تم تفعيل التنبيهات بنجاح"),
        Language::En => ("Notifications Active", "Notifications activated successfully"),
        Language::Fr => ("Notifications Actives", "Notifications activées avec succès"),
    };
    MessageText {
        title: title.to_string(),
        body: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adhan_title_uses_localized_event_label() {
        assert_eq!(adhan(Language::Ar, EventName::Maghrib).title, "المغرب");
        assert_eq!(adhan(Language::En, EventName::Maghrib).title, "Maghrib");
        assert_eq!(event_label(Language::Fr, EventName::Sunrise), "Lever");
    }

    #[test]
    fn pre_reminder_mentions_event() {
        let text = pre_reminder(Language::En, EventName::Asr);
        assert_eq!(text.title, "Approaching Asr");
        assert_eq!(text.body, "15 minutes remaining");
    }
}
