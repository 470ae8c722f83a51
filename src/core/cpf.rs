//! CPF (Central Provident Fund) balance projection.
//!
//! Balances live in three accounts (OA, SA, MA) until the member turns the
//! transfer age, when the SA is folded into a new Retirement Account (RA)
//! that compounds at its own rate. Records are taken before each year's
//! contribution and interest are credited.

use log::debug;

use super::config::{BonusTier, CpfRules};
use super::types::{CpfBalances, CpfProjection};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpfContribution {
    pub oa: f64,
    pub sa: f64,
    pub ma: f64,
}

impl CpfContribution {
    pub fn total(self) -> f64 {
        self.oa + self.sa + self.ma
    }
}

/// Interest earned by each account over one year, bonus tiers included.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpfInterest {
    pub oa: f64,
    pub sa: f64,
    pub ma: f64,
    pub ra: f64,
}

impl CpfInterest {
    pub fn total(self) -> f64 {
        self.oa + self.sa + self.ma + self.ra
    }
}

#[derive(Debug, Clone, Copy)]
struct Accounts {
    oa: f64,
    sa: f64,
    ma: f64,
    ra: f64,
}

impl Accounts {
    fn total(&self) -> f64 {
        self.oa + self.sa + self.ma + self.ra
    }
}

pub fn project_cpf(
    balances: &CpfBalances,
    monthly_salary: f64,
    current_age: u32,
    years_to_project: u32,
    stop_contributions_at_age: u32,
    rules: &CpfRules,
) -> Vec<CpfProjection> {
    let mut accounts = Accounts {
        oa: balances.oa,
        sa: balances.sa,
        ma: balances.ma,
        ra: 0.0,
    };
    let mut ra_opened = false;
    let mut projections = Vec::with_capacity(years_to_project as usize + 1);

    for year in 0..=years_to_project {
        let age = current_age + year;
        let contribution = if age < stop_contributions_at_age {
            annual_contribution(monthly_salary, age, rules)
        } else {
            CpfContribution::default()
        };
        let interest = annual_interest(
            accounts.oa,
            accounts.sa,
            accounts.ma,
            accounts.ra,
            age,
            rules,
        );

        projections.push(CpfProjection {
            age,
            year,
            oa: accounts.oa,
            sa: accounts.sa,
            ma: accounts.ma,
            ra: accounts.ra,
            total: accounts.total(),
            contributions: contribution.total(),
            interest: interest.total(),
        });

        accounts.oa += contribution.oa + interest.oa;
        accounts.ma += contribution.ma + interest.ma;
        accounts.ra += interest.ra;

        if age == rules.transfer_age && year > 0 {
            debug!("cpf: moving SA balance {:.2} into RA at age {age}", accounts.sa);
            accounts.ra += accounts.sa;
            accounts.sa = 0.0;
            ra_opened = true;
        } else if ra_opened {
            accounts.ra += contribution.sa;
        } else {
            accounts.sa += contribution.sa + interest.sa;
        }
    }

    projections
}

/// Annual contribution for a monthly salary, capped at the wage ceiling and
/// split by the age bracket's allocation.
pub fn annual_contribution(monthly_salary: f64, age: u32, rules: &CpfRules) -> CpfContribution {
    let Some(bracket) = rules.bracket_for_age(age) else {
        return CpfContribution::default();
    };
    let wage = monthly_salary.clamp(0.0, rules.monthly_wage_ceiling);
    let total = wage * 12.0 * bracket.total_rate;
    CpfContribution {
        oa: total * bracket.oa_share,
        sa: total * bracket.sa_share,
        ma: total * bracket.ma_share,
    }
}

/// Base interest on each account plus the extra-interest tiers. The senior
/// tier stacks on top of the standard tier; the RA never earns either.
pub fn annual_interest(oa: f64, sa: f64, ma: f64, ra: f64, age: u32, rules: &CpfRules) -> CpfInterest {
    let mut interest = CpfInterest {
        oa: oa * rules.oa_rate,
        sa: sa * rules.sa_rate,
        ma: ma * rules.ma_rate,
        ra: ra * rules.ra_rate,
    };

    add_bonus(&mut interest, oa, sa, ma, &rules.extra_interest);
    if age >= rules.senior_bonus_age {
        add_bonus(&mut interest, oa, sa, ma, &rules.senior_extra_interest);
    }

    interest
}

fn add_bonus(interest: &mut CpfInterest, oa: f64, sa: f64, ma: f64, tier: &BonusTier) {
    let oa_part = oa.max(0.0).min(tier.oa_cap).min(tier.limit);
    let remaining = (tier.limit - oa_part).max(0.0);

    let (sa, ma) = (sa.max(0.0), ma.max(0.0));
    let (sa_share, ma_share) = if sa + ma > 0.0 {
        (sa / (sa + ma), ma / (sa + ma))
    } else {
        (0.5, 0.5)
    };
    let sa_part = sa.min(remaining * sa_share);
    let ma_part = ma.min(remaining * ma_share);

    interest.oa += oa_part * tier.rate;
    interest.sa += sa_part * tier.rate;
    interest.ma += ma_part * tier.rate;
}

/// Blended rate across all accounts; the base SA rate when nothing is held.
pub fn effective_interest_rate(balances: &CpfBalances, age: u32, rules: &CpfRules) -> f64 {
    let total = balances.oa + balances.sa + balances.ma;
    if total <= 0.0 {
        return rules.sa_rate;
    }
    annual_interest(balances.oa, balances.sa, balances.ma, 0.0, age, rules).total() / total
}

/// Rough monthly annuity from an RA balance: a fixed multiplier, no actuarial
/// pricing.
pub fn estimate_monthly_payout(ra_balance: f64, rules: &CpfRules) -> f64 {
    ra_balance.max(0.0) * rules.monthly_payout_multiplier
}

/// Payout estimate from the projected RA at the payout age, if the projection
/// reaches it.
pub fn projected_monthly_payout(projections: &[CpfProjection], rules: &CpfRules) -> Option<f64> {
    projections
        .iter()
        .find(|p| p.age == rules.payout_age)
        .map(|p| estimate_monthly_payout(p.ra, rules))
}
