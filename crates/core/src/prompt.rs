use serde::{Deserialize, Serialize};

use crate::budget::{category_totals, summarize_budget};
use crate::models::{
    BudgetContext, ExpenseCategory, ExpenseContext, ItineraryContext, TripInfoContext,
};

pub const DEFAULT_YEAR: i32 = 2025;

const ITINERARY_SYSTEM: &str = "你是一名专业的旅行规划师，负责制定详细、可执行的旅行行程。只输出符合要求的JSON对象，不要输出任何解释。";
const EXPENSE_SYSTEM: &str = "你负责从用户描述中抽取一条结构化的消费记录。只输出符合给定字段的JSON对象，不要输出任何解释。";
const TRIP_INFO_SYSTEM: &str = "你负责从用户描述中抽取旅行计划的结构化信息。只输出符合给定字段的JSON对象，不要输出任何解释。";
const BUDGET_SYSTEM: &str = "你是一名旅行财务顾问，根据消费记录给出预算分析和省钱建议。只输出符合要求的JSON对象，不要输出任何解释。";

const JSON_ONLY: &str = "只返回一个JSON对象，不要使用Markdown代码块，也不要在JSON前后添加任何文字。";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    default_year: i32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            default_year: DEFAULT_YEAR,
        }
    }
}

impl PromptBuilder {
    pub fn with_default_year(default_year: i32) -> Self {
        Self { default_year }
    }

    pub fn itinerary(&self, context: &ItineraryContext) -> Prompt {
        let mut facts = vec![
            format!("- 目的地：{}", context.destination),
            format!("- 开始日期：{}", context.start_date.format("%Y-%m-%d")),
            format!("- 结束日期：{}", context.end_date.format("%Y-%m-%d")),
            format!("- 旅行天数：{}天", context.days),
        ];
        if let Some(budget) = context.budget {
            facts.push(format!("- 预算：{}元", format_amount(budget)));
        }
        if let Some(preferences) = context.preferences.as_deref() {
            facts.push(format!("- 偏好：{}", preferences));
        }
        if let Some(travelers) = context.travelers {
            facts.push(format!("- 人数：{}人", travelers));
        }

        let user = format!(
            r#"请为以下旅行制定逐日行程。

旅行信息：
{facts}

输出格式：
顶层是一个JSON对象，键依次为 "day1" 到 "day{days}"，每一天的值包含：
- date：字符串，YYYY-MM-DD，从开始日期起逐日递增
- activities：数组，按时间先后排列，每个活动包含以下字段：
  1. time：字符串，HH:MM
  2. activity：字符串，活动名称
  3. location：字符串，地点
  4. duration：字符串，持续时间，如"2小时"
  5. cost：数字，人民币元，免费为0，不确定时为null
  6. type：字符串，活动类型，取 景点/餐饮/住宿/交通/购物/娱乐 之一
  7. description：字符串，一句话描述，可为null

示例（仅示意格式，日期与内容以上面的旅行信息为准）：
{{
  "day1": {{
    "date": "2025-05-01",
    "activities": [
      {{"time": "09:00", "activity": "酒店早餐", "location": "酒店餐厅", "duration": "1小时", "cost": 40, "type": "餐饮", "description": "在酒店享用早餐"}},
      {{"time": "10:30", "activity": "游览中山陵", "location": "紫金山", "duration": "3小时", "cost": 0, "type": "景点", "description": "参观中山陵并在景区步行"}}
    ]
  }},
  "day2": {{
    "date": "2025-05-02",
    "activities": [
      {{"time": "09:30", "activity": "夫子庙秦淮河", "location": "夫子庙", "duration": "2小时", "cost": 80, "type": "景点", "description": "乘船游览秦淮河"}}
    ]
  }}
}}

要求：
1. 每天安排合理连贯，考虑景点之间的交通时间，并包含餐饮、住宿与交通
2. 费用符合当地实际水平，总花费尽量不超过预算
3. 根据旅行人数安排用餐、交通与住宿
4. {json_only}"#,
            facts = facts.join("\n"),
            days = context.days,
            json_only = JSON_ONLY,
        );

        Prompt {
            system: ITINERARY_SYSTEM.to_string(),
            user,
        }
    }

    pub fn expense(&self, context: &ExpenseContext) -> Prompt {
        let user = format!(
            r#"从下面的文本中抽取一条消费记录。

文本：
{text}

字段（无法确定的字段必须为null，不得省略）：
1. amount：数字或null，金额，单位元
2. category：字符串或null，只能取 {categories} 之一，不得自创类别
3. description：字符串或null，简短描述，如"打车到酒店"
4. expense_date：字符串或null，YYYY-MM-DD

规则：
- 金额换算：万→×10000，千→×1000，中文数字转为阿拉伯数字（如"一百五十块"→150）
- 日期：把"10月1日"、"10月1号"等转换为具体日期；未说明年份时一律使用{year}年；无法确定时为null

示例：
文本：国庆节那天晚上吃火锅花了一百二十八块
返回：
{{"amount": 128, "category": "食物", "description": "吃火锅", "expense_date": "{year}-10-01"}}

{json_only}"#,
            text = context.text,
            categories = category_vocabulary(),
            year = self.default_year,
            json_only = JSON_ONLY,
        );

        Prompt {
            system: EXPENSE_SYSTEM.to_string(),
            user,
        }
    }

    pub fn trip_info(&self, context: &TripInfoContext) -> Prompt {
        let reference = match context.reference_date {
            Some(date) => format!(
                "- 今天是{}，\"明天\"、\"下周一\"、\"下个月1号\"等相对日期以今天为基准计算",
                date.format("%Y-%m-%d")
            ),
            None => "- 无法换算的相对日期（如\"明天\"）返回null".to_string(),
        };

        let user = format!(
            r#"从下面的文本中抽取旅行计划信息。

文本：
{text}

字段（文本未提及的字段必须为null，不得省略）：
1. destination：字符串或null，目的地，如"东京"
2. title：字符串或null，根据内容生成的简短标题，不超过10个字，如"南京三日游"
3. start_date：字符串或null，出发日期，YYYY-MM-DD
4. end_date：字符串或null，结束日期，YYYY-MM-DD；只给出天数时由出发日期推算
5. budget：数字或null，预算，单位元
6. travelers：整数或null，旅行人数
7. preferences：字符串或null，多个偏好用"、"分隔

规则：
- 中文数字转为阿拉伯数字（两人→2）
- 金额换算：万→×10000，千→×1000（"一万元"→10000）
- 偏好规范化：吃→美食，带孩子→亲子游，不想早起→悠闲游
- 只给出月日时年份默认为{year}年；"元旦"、"国庆"等节日换算为{year}年对应日期
{reference}

示例：
文本：五一和老婆去成都玩三天，预算五千，想吃火锅看熊猫
返回：
{{"destination": "成都", "title": "成都三日游", "start_date": "{year}-05-01", "end_date": "{year}-05-03", "budget": 5000, "travelers": 2, "preferences": "美食、自然风光"}}

{json_only}"#,
            text = context.text,
            year = self.default_year,
            reference = reference,
            json_only = JSON_ONLY,
        );

        Prompt {
            system: TRIP_INFO_SYSTEM.to_string(),
            user,
        }
    }

    pub fn budget_analysis(&self, context: &BudgetContext) -> Prompt {
        let summary = summarize_budget("", context.budget, &context.expenses);

        let mut facts = vec![
            format!("- 行程：{}", context.title),
            format!("- 目的地：{}", context.destination),
            format!(
                "- 日期：{} 至 {}",
                context.start_date.format("%Y-%m-%d"),
                context.end_date.format("%Y-%m-%d")
            ),
            format!(
                "- 预算：{}",
                context
                    .budget
                    .map(|budget| format!("{}元", format_amount(budget)))
                    .unwrap_or_else(|| "未设置".to_string())
            ),
            format!("- 已花费：{}元", format_amount(summary.total_expenses)),
        ];
        if let Some(remaining) = summary.remaining_budget {
            facts.push(format!("- 剩余：{}元", format_amount(remaining)));
        }
        if let Some(travelers) = context.travelers {
            facts.push(format!("- 人数：{}人", travelers));
        }

        let totals = category_totals(&context.expenses)
            .into_iter()
            .map(|total| {
                format!(
                    "- {}：{}元（{}笔）",
                    total.category.label(),
                    format_amount(total.amount),
                    total.count
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let records = context
            .expenses
            .iter()
            .map(|expense| {
                format!(
                    "- {} | {} | {}元 | {}",
                    expense.expense_date.format("%Y-%m-%d"),
                    expense.category.label(),
                    format_amount(expense.amount),
                    expense.description.as_deref().unwrap_or("无描述")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!(
            r#"请根据以下行程和消费记录进行预算分析。

行程信息：
{facts}

分类汇总：
{totals}

消费明细：
{records}

输出字段：
1. analysis：字符串，200字以内，概括花费结构、与预算的差距以及主要风险
2. suggestions：字符串数组，恰好3条，每条是一条具体可执行的开销建议

示例：
{{"analysis": "目前已花费1200元，占预算的60%，其中交通占比最高……", "suggestions": ["市内出行优先选择地铁", "午餐选择本地小吃替代正餐", "提前在线购买景点门票享受优惠"]}}

{json_only}"#,
            facts = facts.join("\n"),
            totals = totals,
            records = records,
            json_only = JSON_ONLY,
        );

        Prompt {
            system: BUDGET_SYSTEM.to_string(),
            user,
        }
    }
}

fn category_vocabulary() -> String {
    ExpenseCategory::ALL
        .iter()
        .map(|category| category.label())
        .collect::<Vec<_>>()
        .join("/")
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
