/**
 * \brief 静态兜底回答表：按关键字子串匹配查询文本，任何输入都有回答。
 */

const DEFAULT_RESPONSE: &str =
    "I'm SageGreen, your AI assistant for renewable energy solutions.";

const FINANCIAL: &str = "**Financial Summary**\n- Monthly Revenue: $486,900\n- Monthly Expenses: $340,830\n- Net Profit: $146,070 (30% margin)\n- Key Performance: Wind services generating 65% of revenue";

const MAN_HOURS: &str = "**Man-Hours Report**\n- Total: 45,000 hours this month\n- Site A: 12,000 hours\n- Site B: 10,500 hours\n- Site C: 8,200 hours\n- Efficiency: 92% utilization rate";

const SAFETY: &str = "**Safety Guidelines**\n- Hard hats required on all sites\n- Safety glasses mandatory\n- High-visibility vests\n- Steel-toed boots\n- Current safety score: 95%";

const WIND_SERVICES: &str = "**Wind Energy Services**\n- Blade maintenance and repair\n- Turbine installation\n- Electrical systems\n- Preventive maintenance\n- Emergency response 24/7";

const GREETING: &str = "Hello! I'm SageGreen, the Swire Intelligence Assistant. Ask me about financial performance, man-hours, safety guidelines, or wind energy services.";

/** \brief 关键字组 -> 回答。顺序即匹配优先级。 */
const TABLE: &[(&[&str], &str)] = &[
    (&["financial", "finance"], FINANCIAL),
    (&["man-hours", "hours"], MAN_HOURS),
    (&["safety", "ppe"], SAFETY),
    (&["wind", "turbine"], WIND_SERVICES),
    (&["hello", "hi ", "help"], GREETING),
];

/**
 * \brief 查表取兜底回答。大小写不敏感；无匹配时返回默认介绍语。
 */
pub fn lookup(query: &str) -> &'static str {
    let lower = query.to_lowercase();
    for (keywords, response) in TABLE {
        if keywords.iter().any(|k| lower.contains(k)) {
            return response;
        }
    }
    DEFAULT_RESPONSE
}

/** \brief 兜底财务摘要（测试与文档引用）。 */
pub fn financial_summary() -> &'static str {
    FINANCIAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_financial_keyword_returns_summary() {
        assert_eq!(lookup("show me the financial summary"), FINANCIAL);
        assert_eq!(lookup("finance overview please"), FINANCIAL);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("FINANCIAL SUMMARY"), FINANCIAL);
        assert_eq!(lookup("Man-Hours for October"), MAN_HOURS);
    }

    #[test]
    fn test_safety_and_wind_keywords() {
        assert_eq!(lookup("what ppe do I need on site"), SAFETY);
        assert_eq!(lookup("turbine blade maintenance"), WIND_SERVICES);
    }

    #[test]
    fn test_unknown_query_gets_default() {
        assert_eq!(lookup("quarterly pigeon census"), DEFAULT_RESPONSE);
    }

    #[test]
    fn test_first_matching_entry_wins() {
        // "financial" 排在 "hours" 之前。
        assert_eq!(lookup("financial man-hours"), FINANCIAL);
    }
}
