//! Trade statistics over a backtest's SELL records.

use super::portfolio::EquityPoint;
use super::position::{TradeKind, TradeRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BacktestStats {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate_pct: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Largest peak-to-trough decline of realized equity, as a fraction.
    pub max_drawdown: f64,
}

impl BacktestStats {
    pub fn compute(trades: &[TradeRecord], equity_curve: &[EquityPoint]) -> Self {
        let mut stats = BacktestStats::default();

        let profits = trades
            .iter()
            .filter(|t| t.kind == TradeKind::Sell)
            .filter_map(|t| t.realized_profit);

        for pnl in profits {
            stats.total_trades += 1;
            if pnl > 0.0 {
                stats.trades_won += 1;
                stats.gross_profit += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.trades_lost += 1;
                stats.gross_loss += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.trades_breakeven += 1;
            }
        }

        if stats.total_trades > 0 {
            stats.win_rate_pct = stats.trades_won as f64 / stats.total_trades as f64 * 100.0;
        }

        stats.profit_factor = if stats.gross_loss > 0.0 {
            stats.gross_profit / stats.gross_loss
        } else if stats.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        if stats.trades_won > 0 {
            stats.avg_win = stats.gross_profit / stats.trades_won as f64;
        }
        if stats.trades_lost > 0 {
            stats.avg_loss = stats.gross_loss / stats.trades_lost as f64;
        }

        stats.max_drawdown = compute_drawdown(equity_curve);
        stats
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    max_dd
}
