//! Airtime and ZESA fulfillment through the recharge reseller.

use crate::db;
use crate::db::airtime::AirtimeOrder;
use crate::db::zesa::ZesaOrder;
use crate::error::{AppError, AppResult};
use crate::orders::{Network, OrderKind, OrderStatus};
use crate::providers::hotrecharge::airtime_product_id;
use crate::providers::{AirtimeRechargeRequest, ZesaRechargeRequest};
use crate::state::AppState;
use crate::util::now_millis;

pub async fn fulfill_airtime(state: &AppState, order_number: &str) -> AppResult<AirtimeOrder> {
    let load = || async {
        db::airtime::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("airtime order {order_number} not found")))
    };

    let order = load().await?;
    if order.delivered || order.status != OrderStatus::Paid.as_db() {
        return Ok(order);
    }

    let network = Network::from_db(&order.network).ok_or_else(|| {
        AppError::internal(format!(
            "airtime order {order_number} has unknown network '{}'",
            order.network
        ))
    })?;

    let claimed =
        db::order_flow::claim_delivery(&state.pool, OrderKind::Airtime, order_number, now_millis())
            .await?;
    if !claimed {
        // A concurrent caller won the claim; whatever it did stands.
        return load().await;
    }

    let request = AirtimeRechargeRequest {
        product_id: airtime_product_id(network),
        amount: order.airtime_amount,
        target_msisdn: order.recipient_msisdn.clone(),
        agent_reference: order.order_number.clone(),
    };

    match state.recharge.recharge_airtime(&request).await {
        Ok(receipt) => {
            db::order_flow::finish_delivery(
                &state.pool,
                OrderKind::Airtime,
                order_number,
                &receipt.raw.to_string(),
                now_millis(),
            )
            .await?;
            tracing::info!(
                order_number = %order_number,
                reference = %receipt.reference,
                "Airtime delivered"
            );
            load().await
        }
        Err(e) => {
            db::order_flow::revert_delivery(
                &state.pool,
                OrderKind::Airtime,
                order_number,
                &e.to_string(),
                now_millis(),
            )
            .await?;
            Err(e.into())
        }
    }
}

pub async fn fulfill_zesa(state: &AppState, order_number: &str) -> AppResult<ZesaOrder> {
    let load = || async {
        db::zesa::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("zesa order {order_number} not found")))
    };

    let order = load().await?;
    if order.delivered || order.status != OrderStatus::Paid.as_db() {
        return Ok(order);
    }

    let claimed =
        db::order_flow::claim_delivery(&state.pool, OrderKind::Zesa, order_number, now_millis())
            .await?;
    if !claimed {
        return load().await;
    }

    let request = ZesaRechargeRequest {
        meter_number: order.meter_number.clone(),
        amount: order.token_amount,
        notify_msisdn: order.notify_number.clone(),
        agent_reference: order.order_number.clone(),
    };

    match state.recharge.recharge_zesa(&request).await {
        Ok(receipt) => {
            // The raw receipt carries the electricity token the customer needs.
            db::order_flow::finish_delivery(
                &state.pool,
                OrderKind::Zesa,
                order_number,
                &receipt.raw.to_string(),
                now_millis(),
            )
            .await?;
            tracing::info!(
                order_number = %order_number,
                reference = %receipt.reference,
                "ZESA token delivered"
            );
            load().await
        }
        Err(e) => {
            db::order_flow::revert_delivery(
                &state.pool,
                OrderKind::Zesa,
                order_number,
                &e.to_string(),
                now_millis(),
            )
            .await?;
            Err(e.into())
        }
    }
}
