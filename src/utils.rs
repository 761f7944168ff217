use chrono::Duration;

/// Formats a duration as German months and days, using 30-day months.
/// Non-positive durations collapse to `"0 Tage"`.
pub fn format_months_days(duration: Duration) -> String {
    let total_days = duration.num_days();
    if total_days <= 0 {
        return "0 Tage".to_string();
    }

    let months = total_days / 30;
    let days = total_days % 30;

    let day_part = if days == 1 {
        "1 Tag".to_string()
    } else {
        format!("{} Tage", days)
    };

    if months == 0 {
        return day_part;
    }

    let month_part = if months == 1 {
        "1 Monat".to_string()
    } else {
        format!("{} Monate", months)
    };

    if days == 0 {
        month_part
    } else {
        format!("{}, {}", month_part, day_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_only() {
        assert_eq!(format_months_days(Duration::days(5)), "5 Tage");
        assert_eq!(format_months_days(Duration::days(1)), "1 Tag");
    }

    #[test]
    fn test_months_and_days() {
        assert_eq!(format_months_days(Duration::days(35)), "1 Monat, 5 Tage");
        assert_eq!(format_months_days(Duration::days(65)), "2 Monate, 5 Tage");
        assert_eq!(format_months_days(Duration::days(60)), "2 Monate");
    }

    #[test]
    fn test_zero_and_negative() {
        assert_eq!(format_months_days(Duration::days(0)), "0 Tage");
        assert_eq!(format_months_days(Duration::days(-3)), "0 Tage");
    }
}
